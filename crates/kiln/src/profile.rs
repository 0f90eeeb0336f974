use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// Profiler
// ---------------------------------------------------------------------------

/// Wall-clock timings of the stages of one `kilnc` run.
pub struct Profiler {
    stages: Option<Vec<(&'static str, Duration)>>,
}

impl Profiler {
    pub fn new(enabled: bool) -> Self {
        Self {
            stages: enabled.then(|| Vec::with_capacity(8)),
        }
    }

    /// Runs `f`, recording its duration under `stage` when enabled.
    #[inline]
    pub fn time<F, R>(&mut self, stage: &'static str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        match &mut self.stages {
            None => f(),
            Some(stages) => {
                let start = Instant::now();
                let result = f();
                stages.push((stage, start.elapsed()));
                result
            }
        }
    }

    pub fn stages(&self) -> &[(&'static str, Duration)] {
        self.stages.as_deref().unwrap_or_default()
    }

    pub fn report<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
        let Some(stages) = &self.stages else {
            return Ok(());
        };
        let width = stages
            .iter()
            .map(|(stage, _)| stage.len())
            .chain(std::iter::once("Total".len()))
            .max()
            .unwrap_or(0);
        let separator = "-".repeat(width + 28);
        let total: Duration = stages.iter().map(|(_, d)| *d).sum();

        writeln!(writer, "{}", separator)?;
        writeln!(writer, "Lowering Profile")?;
        writeln!(writer, "{}", separator)?;
        for (stage, duration) in stages {
            let share = if total.as_nanos() > 0 {
                duration.as_secs_f64() / total.as_secs_f64() * 100.0
            } else {
                0.0
            };
            writeln!(
                writer,
                "{:<width$} : {:>10.4}ms ({:>5.1}%)",
                stage,
                duration.as_micros() as f64 / 1000.0,
                share,
                width = width
            )?;
        }
        writeln!(writer, "{}", separator)?;
        writeln!(
            writer,
            "{:<width$} : {:>10.4}ms (100.0%)",
            "Total",
            total.as_micros() as f64 / 1000.0,
            width = width
        )?;
        writeln!(writer, "{}", separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_profiler_records_nothing() {
        let mut profiler = Profiler::new(false);
        assert_eq!(profiler.time("load", || 42), 42);
        assert!(profiler.stages().is_empty());

        let mut out = Vec::new();
        profiler.report(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn reports_every_stage() {
        let mut profiler = Profiler::new(true);
        profiler.time("load", || ());
        profiler.time("lower", || ());
        assert_eq!(profiler.stages().len(), 2);

        let mut out = Vec::new();
        profiler.report(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Lowering Profile"));
        assert!(text.contains("load"));
        assert!(text.contains("lower"));
        assert!(text.contains("Total"));
    }
}
