use crate::option::CompileOptions;
use crate::utils::pprint::PrettyPrint;

use std::time;

// Tracks the stages of compiling one histogram operation. Every finished stage is logged with the
// time spent in it. When debug printing is enabled, stages producing code also print that code.
pub struct StageLog {
    label: String,
    debug_print: bool,
    last: time::Instant,
    stages: Vec<(String, time::Duration)>,
}

fn stage_banner<T: PrettyPrint>(label: &str, stage: &str, elapsed: time::Duration, ast: &T) -> String {
    format!("--- {label}: {stage} ({0} us) ---\n{1}", elapsed.as_micros(), ast.pprint_default())
}

impl StageLog {
    pub fn new(label: &str, opts: &CompileOptions) -> StageLog {
        StageLog {
            label: label.to_string(),
            debug_print: opts.debug_print,
            last: time::Instant::now(),
            stages: vec![],
        }
    }

    fn lap(&mut self, stage: &str) -> time::Duration {
        let now = time::Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        self.stages.push((stage.to_string(), elapsed));
        tracing::trace!(
            histogram = %self.label,
            stage,
            elapsed_us = elapsed.as_micros() as u64,
            "finished compilation stage"
        );
        elapsed
    }

    pub fn stage(&mut self, stage: &str) {
        self.lap(stage);
    }

    pub fn stage_with<T: PrettyPrint>(&mut self, stage: &str, ast: &T) {
        let elapsed = self.lap(stage);
        if self.debug_print {
            println!("{}", stage_banner(&self.label, stage, elapsed, ast));
        }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|(s, _)| s.as_str()).collect()
    }

    pub fn total(&self) -> time::Duration {
        self.stages.iter().map(|(_, d)| *d).sum()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::name::Name;

    use regex::Regex;

    #[test]
    fn banner_shows_stage_and_code() {
        let ast = Name::new("y".to_string());
        let s = stage_banner("hist", "x", time::Duration::from_micros(12), &ast);
        let re = Regex::new(r"^--- hist: x \(12 us\) ---\ny").unwrap();
        assert!(re.is_match(&s));
    }

    #[test]
    fn stages_are_recorded_in_order() {
        let mut log = StageLog::new("hist", &CompileOptions::default());
        log.stage("plan");
        log.stage_with("host program", &Name::new("p".to_string()));
        assert_eq!(log.stage_names(), vec!["plan", "host program"]);
        assert!(log.stages.iter().all(|(_, d)| *d <= log.total()));
    }
}
