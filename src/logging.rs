//! Console table printed while training.
//!
//! The table is only printed for `verbosity >= 1`.
//! Structured events go through `tracing` independently of it.
use colored::Colorize;

const WIDTH: usize = 8;
const PREC_WIDTH: usize = 5;
const FULL_WIDTH: usize = 60;
const STAT_WIDTH: usize = (FULL_WIDTH - 4) / 2;

/// Prints the stats banner and the per-round scores.
#[derive(Debug, Clone)]
pub struct TrainingLogger {
    verbosity: i32,
    interval: usize,
}

impl TrainingLogger {
    /// A logger printing every `interval` rounds when `verbosity >= 1`.
    pub fn new(verbosity: i32, interval: usize) -> Self {
        Self { verbosity, interval: interval.max(1) }
    }

    /// A logger that prints nothing.
    pub fn silent() -> Self {
        Self::new(0, 1)
    }

    fn enabled(&self) -> bool {
        self.verbosity >= 1
    }

    /// Prints the configuration of the booster and of the weak learner.
    pub fn print_stats(
        &self,
        booster: (&str, Option<Vec<(&str, String)>>),
        weak_learner: (&str, Option<Vec<(&str, String)>>),
    )
    {
        if !self.enabled() { return; }

        let header = format!(
            "{:=>FULL_WIDTH$}\n{:^FULL_WIDTH$}\n{:->FULL_WIDTH$}",
            "", "STATS".bold(), "",
        );
        println!("\n{header}");
        for (title, (name, info)) in [("Booster", booster), ("Weak Learner", weak_learner)] {
            println!(
                "+ {:<STAT_WIDTH$}\t{:>STAT_WIDTH$}",
                title.bold(),
                name.bold().green(),
            );
            if let Some(info) = info {
                let line = info.into_iter()
                    .map(|(key, val)| {
                        format!(
                            "    + {:<STAT_WIDTH$}\t{:>width$}",
                            key,
                            val.bold().yellow(),
                            width = STAT_WIDTH - 8
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                println!("{line}");
            }
        }
        println!("{:=^FULL_WIDTH$}\n", "");
    }

    pub fn print_log_header(&self) {
        if !self.enabled() { return; }
        println!(
            "      {:>WIDTH$}\t\t{:>WIDTH$}\t{:>WIDTH$}\t{:>WIDTH$}",
            "".bold().red(),
            "TRAIN".bold().green(),
            "VALID".bold().yellow(),
            "ACC.".bold().cyan(),
        );
        println!(
            "      {:>WIDTH$}\t\t{:>WIDTH$}\t{:>WIDTH$}\t{:>WIDTH$}\n",
            "ROUND".bold().red(),
            "LOSS".bold().green(),
            "LOSS".bold().yellow(),
            "TIME".bold().cyan(),
        );
    }

    /// Prints one row every `interval` rounds.
    /// `valid` is `None` without validation data.
    pub fn log_round(&self, iteration: usize, train: f64, valid: Option<f64>, time_acc: u128) {
        if !self.enabled() || iteration % self.interval != 0 { return; }
        println!(
            "{} {}\t\t{}\t{}\t{}",
            "[LOG]".bold().magenta(),
            format!("{:>WIDTH$}", iteration).red(),
            format!("{:>WIDTH$.PREC_WIDTH$}", train).green(),
            format_valid(valid).yellow(),
            time_format(time_acc).bold().cyan(),
        );
    }

    /// Prints the final row.
    pub fn log_finish(&self, iteration: usize, train: f64, valid: Option<f64>, time_acc: u128) {
        if !self.enabled() { return; }
        println!(
            "{} {}\t\t{}\t{}\t{}\n",
            "[FIN]".bold().bright_green(),
            format!("{:>WIDTH$}", iteration).red(),
            format!("{:>WIDTH$.PREC_WIDTH$}", train).bold().green(),
            format_valid(valid).bold().yellow(),
            time_format(time_acc).bold().cyan(),
        );
    }
}

fn format_valid(valid: Option<f64>) -> String {
    match valid {
        Some(loss) => format!("{:>WIDTH$.PREC_WIDTH$}", loss),
        None => format!("{:>WIDTH$}", "-"),
    }
}

/// Formats a duration given in milliseconds.
pub fn time_format(millisec: u128) -> String {
    if millisec < 1_000 {
        return format!("  0.{:0>3}s", millisec);
    }
    let sec = millisec / 1_000;
    let millisec = millisec % 1_000;
    if sec < 60 {
        return format!(" {:0>2}.{:0>3}s", sec, millisec);
    }
    let min = sec / 60;
    let sec = sec % 60;
    if min < 60 {
        return format!(" {:0>2}m {:0>2}s", min, sec);
    }
    let hours = min / 60;
    let min = min % 60;
    format!(" {:0>2}h {:0>2}m", hours, min)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_durations() {
        assert_eq!(time_format(42), "  0.042s");
        assert_eq!(time_format(5_300), " 05.300s");
        assert_eq!(time_format(125_000), " 02m 05s");
        assert_eq!(time_format(3_780_000), " 01h 03m");
    }
}
