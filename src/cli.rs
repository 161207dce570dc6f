//! Command-line interface implementation for wtemplate.
//! Provides argument parsing and help text formatting using clap.

use crate::error::{default_error_handler, Error};
use clap::{error::ErrorKind, CommandFactory, Parser};
use std::path::PathBuf;

/// Command-line arguments structure for wtemplate.
#[derive(Parser, Debug)]
#[command(author, version, about = "wtemplate: compile and render brace-node templates", long_about = None)]
pub struct Args {
    /// Path to the template file to render
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// JSON or YAML file holding the template variables
    #[arg(long, value_name = "FILE")]
    pub vars: Option<PathBuf>,

    /// Read template variables from stdin
    #[arg(short, long)]
    pub stdin: bool,

    /// Write the rendered output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Engine configuration file.
    /// Defaults to wtemplate.json, wtemplate.yml or wtemplate.yaml
    /// in the template's directory when present.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Parses command line arguments and returns the Args structure.
///
/// # Returns
/// * `Args` - Parsed command line arguments
///
/// # Exits
/// * With status code 1 if required arguments are missing
/// * With clap's default error handling for other argument errors
pub fn get_args() -> Args {
    match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            if e.kind() == ErrorKind::MissingRequiredArgument {
                let printed = Args::command()
                    .help_template(
                        r#"{about-section}
{usage-heading} {usage}

{all-args}
{after-help}
"#,
                    )
                    .print_help();
                if let Err(err) = printed {
                    default_error_handler(Error::IoError(err));
                }
                std::process::exit(1);
            } else {
                e.exit();
            }
        }
    }
}
