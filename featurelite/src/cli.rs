use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// FeatureLite - validate generated code and run it as sandboxed, hot-swappable features
#[derive(Parser, Debug)]
#[command(name = "featurelite")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Execution timeout in milliseconds (default: from env or 5000)
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// Maximum candidate source size in bytes (default: from env or 50000)
    #[arg(long, global = true)]
    pub max_source_bytes: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a plan (JSON) against schema, content and path policy
    CheckPlan {
        /// Path to the plan JSON file, or "-" for stdin
        #[arg(value_name = "PLAN")]
        plan: String,
    },

    /// Static analysis of a candidate script (size, banned patterns, complexity)
    Scan {
        /// Path to the script file
        #[arg(value_name = "CODE")]
        code: PathBuf,

        /// Output the full report as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Evaluate a candidate script in the sandbox and print the report
    Sandbox {
        /// Path to the script file
        #[arg(value_name = "CODE")]
        code: PathBuf,
    },

    /// Run plan + code through the full pipeline and register the feature on acceptance
    Submit {
        /// Path to the plan JSON file
        #[arg(long, value_name = "PLAN")]
        plan: PathBuf,

        /// Path to the script file
        #[arg(long, value_name = "CODE")]
        code: PathBuf,
    },

    /// List registered features
    List {
        /// Output as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Show one feature
    Show {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Invoke a feature's entry point
    Invoke {
        #[arg(value_name = "ID")]
        id: String,

        /// Input JSON string. Use "-" to read from stdin
        #[arg(value_name = "INPUT_JSON", default_value = "{}")]
        input_json: String,
    },

    /// Delete a feature and its persisted artifact
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Run as daemon over one live registry: JSON-RPC requests on stdin, responses on stdout.
    /// Lifecycle operations (deactivate, reload, dispatch, self_test) are served here.
    Serve {
        /// Use stdio for IPC
        #[arg(long, default_value = "true")]
        stdio: bool,
    },
}
