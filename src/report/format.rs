//! Formatted terminal output for the `lxe` binary.
//!
//! Formatting lives here so the engine stays free of presentation concerns.

use crate::domain::{AnnotatedEvent, ModelConfig, MultiSiteEvent, Multiplicity, SimulatedEvent};
use crate::engine::{Evaluation, LogLikelihood, MultiSiteEvaluation};
use crate::io::ingest::IngestedEvents;
use crate::report::RankedEvent;

fn header(config: &ModelConfig) -> String {
    match config.multiplicity {
        Multiplicity::Single => format!(
            "=== lxe - {} emission model (max_sigma={}) ===\n",
            config.model.display_name(),
            config.max_sigma
        ),
        m => format!(
            "=== lxe - {} {} source ===\n",
            m.name(),
            config.model.display_name()
        ),
    }
}

fn acceptance_line(requested: usize, accepted: usize) -> String {
    let fraction = if requested > 0 { accepted as f64 / requested as f64 } else { 0.0 };
    format!(
        "Simulated: requested={requested} accepted={accepted} ({:.2}%)\n",
        100.0 * fraction
    )
}

fn likelihood_section(ll: &LogLikelihood, lowest: &[RankedEvent]) -> String {
    let mut out = String::from("\nLikelihood:\n");
    out.push_str(&format!("- events with zero density: {}\n", ll.zero_count));
    out.push_str(&format!("- sum ln L                : {:.6}\n", ll.total));

    if !lowest.is_empty() {
        out.push_str("\nLowest-density events:\n");
        out.push_str(&format!("{:>6}  {:>10}  {:>10}  {:>14}\n", "row", "s1", "s2", "density"));
        for r in lowest {
            out.push_str(&format!(
                "{:>6}  {:>10.3}  {:>10.1}  {:>14.6e}\n",
                r.index, r.s1, r.s2, r.density
            ));
        }
    }
    out
}

/// Summary of a simulation run.
pub fn format_simulation_summary(config: &ModelConfig, requested: usize, events: &[SimulatedEvent]) -> String {
    let mut out = header(config);
    let accepted = events.len();
    out.push_str(&acceptance_line(requested, accepted));
    if events.is_empty() {
        return out;
    }

    let mean = |f: fn(&SimulatedEvent) -> f64| events.iter().map(f).sum::<f64>() / accepted as f64;
    out.push_str("\nMean latent values (accepted events):\n");
    out.push_str(&format!("- energy            : {:.3} keV\n", mean(|e| e.energy)));
    out.push_str(&format!("- nq                : {:.1}\n", mean(|e| e.nq as f64)));
    out.push_str(&format!("- p_el (actual)     : {:.4}\n", mean(|e| e.p_el_actual)));
    out.push_str(&format!(
        "- produced  ph / el : {:.1} / {:.1}\n",
        mean(|e| e.photon_produced as f64),
        mean(|e| e.electron_produced as f64)
    ));
    out.push_str(&format!(
        "- detected  ph / el : {:.1} / {:.1}\n",
        mean(|e| e.photon_detected as f64),
        mean(|e| e.electron_detected as f64)
    ));
    out.push_str(&format!(
        "- s1 / s2           : {:.2} / {:.1}\n",
        mean(|e| e.event.s1),
        mean(|e| e.event.s2)
    ));
    out
}

/// Dataset line shared by `annotate` and `evaluate`.
pub fn format_ingest_summary(ingest: &IngestedEvents) -> String {
    let mut out = format!(
        "Events: n={} | s1=[{:.2}, {:.2}] | s2=[{:.1}, {:.1}]\n",
        ingest.stats.n_events, ingest.stats.s1_min, ingest.stats.s1_max, ingest.stats.s2_min, ingest.stats.s2_max
    );
    if !ingest.row_errors.is_empty() {
        out.push_str(&format!(
            "Skipped rows: {} of {} (first: line {}: {})\n",
            ingest.row_errors.len(),
            ingest.rows_read,
            ingest.row_errors[0].line,
            ingest.row_errors[0].message
        ));
    }
    out
}

/// Mean domain sizes over annotated events.
pub fn format_annotation_summary(config: &ModelConfig, annotated: &[AnnotatedEvent]) -> String {
    let mut out = header(config);
    out.push_str(&format!("Annotated: {} events\n", annotated.len()));
    if annotated.is_empty() {
        return out;
    }
    let n = annotated.len() as f64;
    let mean_len = |f: fn(&AnnotatedEvent) -> usize| annotated.iter().map(|a| f(a) as f64).sum::<f64>() / n;
    out.push_str("\nMean domain sizes:\n");
    out.push_str(&format!(
        "- detected  ph / el : {:.1} / {:.1}\n",
        mean_len(|a| a.annotation.bounds.photon_detected.len()),
        mean_len(|a| a.annotation.bounds.electron_detected.len())
    ));
    out.push_str(&format!(
        "- produced  ph / el : {:.1} / {:.1}\n",
        mean_len(|a| a.annotation.bounds.photon_produced.len()),
        mean_len(|a| a.annotation.bounds.electron_produced.len())
    ));
    out.push_str(&format!(
        "- nq                : {:.1}\n",
        mean_len(|a| a.annotation.bounds.nq.len())
    ));
    out
}

/// Density summary plus the least likely events.
pub fn format_evaluation_summary(config: &ModelConfig, evaluation: &Evaluation, lowest: &[RankedEvent]) -> String {
    let mut out = format_annotation_summary(config, &evaluation.annotated);
    out.push_str(&likelihood_section(&evaluation.log_likelihood, lowest));
    out
}

/// Summary of a multi-site simulation run.
pub fn format_multisite_summary(config: &ModelConfig, requested: usize, events: &[MultiSiteEvent]) -> String {
    let mut out = header(config);
    out.push_str(&acceptance_line(requested, events.len()));
    if events.is_empty() {
        return out;
    }
    let n = events.len() as f64;
    let mean = |f: fn(&MultiSiteEvent) -> f64| events.iter().map(f).sum::<f64>() / n;
    out.push_str("\nMeans (accepted events):\n");
    out.push_str(&format!("- total energy      : {:.3} keV\n", mean(|e| e.total_energy())));
    out.push_str(&format!(
        "- s1 / s2           : {:.2} / {:.1}\n",
        mean(|e| e.event.s1),
        mean(|e| e.event.s2)
    ));
    out
}

/// Density summary of a multi-site evaluation.
pub fn format_multisite_evaluation(
    config: &ModelConfig,
    evaluation: &MultiSiteEvaluation,
    lowest: &[RankedEvent],
) -> String {
    let mut out = header(config);
    out.push_str(&format!("Evaluated: {} events\n", evaluation.events.len()));
    out.push_str(&likelihood_section(&evaluation.log_likelihood, lowest));
    out
}

/// Expected event count.
pub fn format_mu(config: &ModelConfig, mu_before: f64, mu: f64, n_trials: usize) -> String {
    let mut out = header(config);
    out.push_str(&format!("mu before efficiencies : {mu_before:.6}\n"));
    out.push_str(&format!("mu (n_trials={n_trials:<8}) : {mu:.6}\n"));
    out
}
