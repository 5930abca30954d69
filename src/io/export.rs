//! CSV exports: simulated events, annotations and evaluated densities.
//!
//! Every export is plain CSV with one header row, easy to load in
//! spreadsheets or dataframe libraries. Simulated files keep the `s1`/`s2`
//! column names so they can be fed straight back into `annotate`/`evaluate`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{AnnotatedEvent, CountBounds, MultiSiteEvent, SimulatedEvent};
use crate::engine::{Evaluation, MultiSiteEvaluation};
use crate::error::AppError;

fn create(path: &Path) -> Result<BufWriter<File>, AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

fn write_err(e: std::io::Error) -> AppError {
    AppError::io(format!("Failed to write export CSV: {e}"))
}

/// Write simulated events with all latent columns.
pub fn write_simulated_csv(path: &Path, events: &[SimulatedEvent]) -> Result<(), AppError> {
    let mut out = create(path)?;
    write_simulated(&mut out, events)?;
    out.flush().map_err(write_err)
}

pub fn write_simulated<W: Write>(out: &mut W, events: &[SimulatedEvent]) -> Result<(), AppError> {
    writeln!(
        out,
        "s1,s2,x,y,z,r,theta,drift_time,event_time,energy,nq,p_el_mean,p_el_fluct,p_el_actual,\
         electron_produced,photon_produced,electron_detected,photon_detected"
    )
    .map_err(write_err)?;

    for s in events {
        let e = &s.event;
        writeln!(
            out,
            "{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.3},{:.0},{:.6},{},{:.8},{:.8},{:.8},{},{},{},{}",
            e.s1,
            e.s2,
            e.x,
            e.y,
            e.z,
            e.r,
            e.theta,
            e.drift_time,
            e.event_time,
            s.energy,
            s.nq,
            s.p_el_mean,
            s.p_el_fluct,
            s.p_el_actual,
            s.electron_produced,
            s.photon_produced,
            s.electron_detected,
            s.photon_detected,
        )
        .map_err(write_err)?;
    }
    Ok(())
}

/// Write annotated events: nominal model values, MLEs and every domain.
pub fn write_annotated_csv(path: &Path, annotated: &[AnnotatedEvent]) -> Result<(), AppError> {
    let mut out = create(path)?;
    write_annotated(&mut out, annotated, None)?;
    out.flush().map_err(write_err)
}

/// Write annotated events followed by their densities.
pub fn write_evaluation_csv(path: &Path, evaluation: &Evaluation) -> Result<(), AppError> {
    let mut out = create(path)?;
    write_annotated(&mut out, &evaluation.annotated, Some(&evaluation.densities))?;
    out.flush().map_err(write_err)
}

pub fn write_annotated<W: Write>(
    out: &mut W,
    annotated: &[AnnotatedEvent],
    densities: Option<&[f64]>,
) -> Result<(), AppError> {
    if let Some(d) = densities {
        if d.len() != annotated.len() {
            return Err(AppError::computation(format!(
                "Cannot export {} densities for {} events.",
                d.len(),
                annotated.len()
            )));
        }
    }

    let bound_cols = ["photon_detected", "photon_produced", "electron_detected", "electron_produced", "nq"]
        .iter()
        .map(|n| format!("{n}_min,{n}_mle,{n}_max"))
        .collect::<Vec<_>>()
        .join(",");
    write!(
        out,
        "s1,s2,drift_time,event_time,photon_detection_eff,electron_detection_eff,\
         penning_quenching_eff_mle,e_vis,nq_vis_mle,fel_mle,{bound_cols}"
    )
    .map_err(write_err)?;
    if densities.is_some() {
        write!(out, ",density,ln_density").map_err(write_err)?;
    }
    writeln!(out).map_err(write_err)?;

    for (i, a) in annotated.iter().enumerate() {
        let e = &a.event;
        let ann = &a.annotation;
        let b = &ann.bounds;
        let bounds = [
            b.photon_detected,
            b.photon_produced,
            b.electron_detected,
            b.electron_produced,
            b.nq,
        ]
        .iter()
        .map(fmt_bounds)
        .collect::<Vec<_>>()
        .join(",");
        write!(
            out,
            "{:.6},{:.6},{:.3},{:.0},{:.8},{:.8},{:.8},{:.6},{:.4},{:.8},{}",
            e.s1,
            e.s2,
            e.drift_time,
            e.event_time,
            ann.photon.detection_eff,
            ann.electron.detection_eff,
            ann.penning_quenching_eff_mle,
            ann.e_vis,
            ann.nq_vis_mle,
            ann.fel_mle,
            bounds,
        )
        .map_err(write_err)?;
        if let Some(d) = densities {
            let ln = if d[i] > 0.0 { d[i].ln() } else { f64::NEG_INFINITY };
            write!(out, ",{:e},{}", d[i], ln).map_err(write_err)?;
        }
        writeln!(out).map_err(write_err)?;
    }
    Ok(())
}

/// Write simulated multi-site events: signals, total energy and one column
/// per site.
pub fn write_multisite_csv(path: &Path, events: &[MultiSiteEvent]) -> Result<(), AppError> {
    let mut out = create(path)?;
    write_multisite(&mut out, events)?;
    out.flush().map_err(write_err)
}

pub fn write_multisite<W: Write>(out: &mut W, events: &[MultiSiteEvent]) -> Result<(), AppError> {
    let sites = events.iter().map(|e| e.energies.len()).max().unwrap_or(0);
    let site_cols: String = (1..=sites).map(|i| format!(",energy_{i}")).collect();
    writeln!(out, "s1,s2,energy{site_cols}").map_err(write_err)?;
    for m in events {
        write!(out, "{:.6},{:.6},{:.6}", m.event.s1, m.event.s2, m.total_energy()).map_err(write_err)?;
        for i in 0..sites {
            match m.energies.get(i) {
                Some(e) => write!(out, ",{e:.6}").map_err(write_err)?,
                None => write!(out, ",").map_err(write_err)?,
            }
        }
        writeln!(out).map_err(write_err)?;
    }
    Ok(())
}

/// Write multi-site densities of observed events.
pub fn write_multisite_evaluation_csv(path: &Path, evaluation: &MultiSiteEvaluation) -> Result<(), AppError> {
    let mut out = create(path)?;
    writeln!(out, "s1,s2,density,ln_density").map_err(write_err)?;
    let rows = evaluation
        .events
        .iter()
        .zip(&evaluation.densities)
        .zip(&evaluation.log_likelihood.terms);
    for ((e, d), ln) in rows {
        writeln!(out, "{:.6},{:.6},{:e},{}", e.s1, e.s2, d, ln).map_err(write_err)?;
    }
    out.flush().map_err(write_err)
}

fn fmt_bounds(b: &CountBounds) -> String {
    format!("{},{},{}", b.min, b.mle, b.max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Event;

    fn sim() -> SimulatedEvent {
        SimulatedEvent {
            event: Event::from_signals(12.0, 900.0),
            energy: 2.5,
            nq: 182,
            p_el_mean: 0.5,
            p_el_fluct: 0.03,
            p_el_actual: 0.48,
            electron_produced: 87,
            photon_produced: 95,
            electron_detected: 83,
            photon_detected: 10,
        }
    }

    #[test]
    fn simulated_export_has_one_row_per_event() {
        let mut buf = Vec::new();
        write_simulated(&mut buf, &[sim(), sim()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let header: Vec<&str> = lines[0].split(',').collect();
        let row: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(header.len(), row.len());
        assert_eq!(header[0], "s1");
        assert_eq!(row[10], "182");
    }

    #[test]
    fn multi_site_export_has_one_column_per_site() {
        let e = MultiSiteEvent {
            event: Event::from_signals(40.0, 8000.0),
            energies: vec![10.0, 20.0],
        };
        let mut buf = Vec::new();
        write_multisite(&mut buf, &[e]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "s1,s2,energy,energy_1,energy_2");
        assert_eq!(lines[1], "40.000000,8000.000000,30.000000,10.000000,20.000000");
    }
}
