use std::{fmt::Display, str::FromStr, time::Duration};

use clap::{ArgAction, Parser};
use recompiler::RecompileConfig;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(
    name = "recompiler-sim",
    author,
    version,
    about = "Runs a synthetic call workload against the background recompiler"
)]
pub struct Options {
    #[arg(
        long = "functions",
        default_value_t = 32,
        value_name = "COUNT",
        help = "Number of synthetic functions called round-robin.",
        help_heading = "Workload options",
        env = "RECOMPILER_FUNCTIONS"
    )]
    pub functions: usize,
    #[arg(
        long = "calls",
        default_value_t = 100_000,
        value_name = "COUNT",
        help = "Total number of calls to make.",
        help_heading = "Workload options",
        env = "RECOMPILER_CALLS"
    )]
    pub calls: u64,
    #[arg(
        long = "hot-threshold",
        default_value_t = 1_000,
        value_name = "CALLS",
        help = "Calls after which a function is queued for optimization.",
        help_heading = "Workload options",
        env = "RECOMPILER_HOT_THRESHOLD"
    )]
    pub hot_threshold: u64,
    #[arg(
        long = "compile-cost-us",
        default_value_t = 500,
        value_name = "MICROS",
        help = "Time a single optimizing compile takes.",
        help_heading = "Workload options",
        env = "RECOMPILER_COMPILE_COST_US"
    )]
    pub compile_cost_us: u64,
    #[arg(
        long = "install-interval",
        default_value_t = 64,
        value_name = "CALLS",
        help = "Run an install pass every this many calls.",
        help_heading = "Workload options",
        env = "RECOMPILER_INSTALL_INTERVAL"
    )]
    pub install_interval: u64,
    #[arg(
        long = "compact-interval",
        default_value_t = 4_096,
        value_name = "CALLS",
        help = "Simulate a heap compaction every this many calls. 0 disables it.",
        help_heading = "Workload options",
        env = "RECOMPILER_COMPACT_INTERVAL"
    )]
    pub compact_interval: u64,
    #[arg(
        long = "recompiler.inline",
        action = ArgAction::SetTrue,
        help = "Compile on the calling thread instead of a background thread.",
        help_heading = "Recompiler options",
        env = "RECOMPILER_INLINE"
    )]
    pub inline: bool,
    #[arg(
        long = "recompiler.delay-ms",
        value_name = "MILLIS",
        help = "Diagnostic delay the compiler thread sleeps after each wake-up.",
        long_help = "When set, stopping the recompiler also compiles and installs whatever is still queued.",
        help_heading = "Recompiler options",
        env = "RECOMPILER_DELAY_MS"
    )]
    pub recompile_delay_ms: Option<u64>,
    #[arg(
        long = "recompiler.trace",
        action = ArgAction::SetTrue,
        help = "Report how much of its lifetime the compiler thread spent compiling.",
        help_heading = "Recompiler options",
        env = "RECOMPILER_TRACE"
    )]
    pub trace_recompilation: bool,
    #[arg(
        long = "recompiler.queue-capacity",
        default_value_t = 8,
        value_name = "JOBS",
        help = "Maximum number of jobs waiting for the compiler thread.",
        help_heading = "Recompiler options",
        env = "RECOMPILER_QUEUE_CAPACITY"
    )]
    pub queue_capacity: usize,
    #[arg(
        long = "log.level",
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        env = "RECOMPILER_LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error",
        help_heading = "Log options"
    )]
    pub log_level: Level,
    #[arg(
        long = "log.color",
        default_value_t = LogColor::Auto,
        help = "Output logs with ANSI color codes.",
        long_help = "Possible values: auto, always, never",
        help_heading = "Log options",
        env = "RECOMPILER_LOG_COLOR"
    )]
    pub log_color: LogColor,
}

impl Options {
    pub fn recompile_config(&self) -> RecompileConfig {
        RecompileConfig {
            concurrent_recompilation: !self.inline,
            recompile_delay: self.recompile_delay_ms.map(Duration::from_millis),
            trace_recompilation: self.trace_recompilation,
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn compile_cost(&self) -> Duration {
        Duration::from_micros(self.compile_cost_us)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LogColor {
    #[default]
    Auto,
    Always,
    Never,
}

impl Display for LogColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogColor::Auto => write!(f, "auto"),
            LogColor::Always => write!(f, "always"),
            LogColor::Never => write!(f, "never"),
        }
    }
}

impl FromStr for LogColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(LogColor::Auto),
            "always" => Ok(LogColor::Always),
            "never" => Ok(LogColor::Never),
            _ => Err(format!(
                "Invalid log color '{s}'. Expected: auto, always, or never"
            )),
        }
    }
}
