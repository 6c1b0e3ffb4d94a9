//! Diagnostic accumulation: provisional-call samples and the
//! unresolved-name histogram, capped for the final report.
//!
//! Higher-order reference samples (`partial(greet, 'x')`-style) are a
//! purely internal signal: they are logged via `tracing::debug!` as they
//! are found rather than added as a sixth report key, keeping the `diag`
//! object's externally visible shape exactly the five fields documented
//! for it.

use serde::Serialize;

use crate::types::DiagSample;

const SAMPLE_CAP: usize = 25;
const HIST_CAP: usize = 20;

#[derive(Debug, Default, Serialize)]
pub struct Diagnostics {
    pub cross_alias_total: usize,
    pub from_import_total: usize,
    pub cross_alias_samples: Vec<DiagSample>,
    pub from_import_samples: Vec<DiagSample>,
    pub unresolved_hist: Vec<(String, usize)>,
}

#[derive(Default)]
pub struct DiagnosticsBuilder {
    cross_alias_total: usize,
    from_import_total: usize,
    cross_alias_samples: Vec<DiagSample>,
    from_import_samples: Vec<DiagSample>,
}

impl DiagnosticsBuilder {
    pub fn add_cross_alias(&mut self, samples: Vec<DiagSample>) {
        self.cross_alias_total += samples.len();
        for s in samples {
            if self.cross_alias_samples.len() < SAMPLE_CAP {
                self.cross_alias_samples.push(s);
            }
        }
    }

    pub fn add_from_import(&mut self, samples: Vec<DiagSample>) {
        self.from_import_total += samples.len();
        for s in samples {
            if self.from_import_samples.len() < SAMPLE_CAP {
                self.from_import_samples.push(s);
            }
        }
    }

    /// Higher-order reference samples never enter the report; each is
    /// logged at debug level as it is found.
    pub fn note_higher_order(&mut self, samples: Vec<DiagSample>) {
        for s in samples {
            tracing::debug!(caller = %s.caller, name = %s.name, target = %s.target, "higher-order reference");
        }
    }

    pub fn finish(self, mut unresolved_hist: Vec<(String, usize)>) -> Diagnostics {
        unresolved_hist.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        unresolved_hist.truncate(HIST_CAP);
        Diagnostics {
            cross_alias_total: self.cross_alias_total,
            from_import_total: self.from_import_total,
            cross_alias_samples: self.cross_alias_samples,
            from_import_samples: self.from_import_samples,
            unresolved_hist,
        }
    }
}
