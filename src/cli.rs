use crate::config::Config;
use crate::taxonomy::HallucinationType;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Terminal,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "halluscan",
    version,
    about = "Hallucination detector for AI-generated Python code",
    long_about = "halluscan checks AI-generated Python code for hallucinations: type and structure mismatches, \
                  undefined or fabricated names, unbounded resource use and broken logic. It combines pattern \
                  rules, static analysis and a resource-limited sandbox run."
)]
pub struct Cli {
    /// File to analyze, or `-` to read from stdin
    #[arg(default_value = "-")]
    pub file: PathBuf,

    /// Language of the code
    #[arg(short, long, default_value = "python")]
    pub language: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Terminal)]
    pub format: OutputFormat,

    /// Drop findings below this confidence (0.0 - 1.0)
    #[arg(long)]
    pub confidence_threshold: Option<f64>,

    /// Only report these hallucination types (comma separated)
    #[arg(long, value_enum, value_delimiter = ',')]
    pub focus: Vec<HallucinationType>,

    /// Do not run the code in the sandbox
    #[arg(long)]
    pub no_execution: bool,

    /// Skip static structure analysis
    #[arg(long)]
    pub no_static: bool,

    /// Skip pattern rules
    #[arg(long)]
    pub no_patterns: bool,

    /// Leave recommendations out of the report
    #[arg(long)]
    pub no_recommendations: bool,

    /// Sandbox wall-clock limit in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Sandbox memory limit in MB
    #[arg(long)]
    pub max_memory_mb: Option<u64>,

    /// CPU cores the sandboxed process may use
    #[arg(long)]
    pub max_cpu_cores: Option<usize>,

    /// Python interpreter to use instead of `python3` from PATH
    #[arg(long)]
    pub interpreter: Option<PathBuf>,

    /// Path to a configuration file (yaml, json or toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn reads_stdin(&self) -> bool {
        self.file.as_os_str() == "-"
    }

    /// Label used for the input in reports.
    pub fn input_name(&self) -> String {
        if self.reads_stdin() {
            "<stdin>".to_string()
        } else {
            self.file.display().to_string()
        }
    }

    /// Directory searched for a project config file.
    pub fn project_root(&self) -> Option<&Path> {
        if self.reads_stdin() {
            return Some(Path::new("."));
        }
        match self.file.parent() {
            Some(parent) if parent.as_os_str().is_empty() => Some(Path::new(".")),
            parent => parent,
        }
    }

    /// Layer command-line flags over a loaded configuration.
    pub fn apply(&self, config: &mut Config) {
        let detection = &mut config.detection;
        if let Some(threshold) = self.confidence_threshold {
            detection.confidence_threshold = threshold;
        }
        if !self.focus.is_empty() {
            detection.focus_categories = Some(self.focus.clone());
        }
        if self.no_execution {
            detection.enable_execution_analysis = false;
        }
        if self.no_static {
            detection.enable_static_analysis = false;
        }
        if self.no_patterns {
            detection.enable_pattern_matching = false;
        }
        if self.no_recommendations {
            detection.generate_recommendations = false;
        }
        if let Some(timeout) = self.timeout_ms {
            detection.max_execution_time_ms = timeout;
        }

        let sandbox = &mut config.sandbox;
        if let Some(memory) = self.max_memory_mb {
            sandbox.limits.max_memory_mb = memory;
        }
        if let Some(cores) = self.max_cpu_cores {
            sandbox.limits.max_cpu_cores = cores;
        }
        if let Some(interpreter) = &self.interpreter {
            sandbox.interpreter = Some(interpreter.clone());
        }
    }
}
