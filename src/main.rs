//! wtemplate's command-line entry point.
//! Loads configuration and variables, renders one template and writes the result.

use wtemplate::{
    cli::{get_args, Args},
    config::{get_config, get_variables_from, load_config_file},
    engine::Engine,
    error::{default_error_handler, Error, Result},
    logger::init_logger,
};

/// Main application entry point.
fn main() {
    let args = get_args();
    init_logger(args.verbose);

    if let Err(err) = run(args) {
        default_error_handler(err);
    }
}

/// Renders the template named on the command line.
///
/// # Flow
/// 1. Loads the explicit configuration file, or the one next to the template
/// 2. Reads variables from `--vars` or stdin
/// 3. Compiles the template with its directory as the include hint
/// 4. Writes the output to `--output` or stdout
fn run(args: Args) -> Result<()> {
    let template_dir = args
        .template
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.to_path_buf());

    let config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => get_config(template_dir.clone().unwrap_or_else(|| ".".into()))?,
    };
    let variables = get_variables_from(args.vars.as_deref(), args.stdin)?;

    let mut engine = Engine::with_config(config);
    engine.assign_all(variables, false);

    let source = std::fs::read_to_string(&args.template).map_err(|e| {
        Error::IoError(std::io::Error::new(
            e.kind(),
            format!("{}: {e}", args.template.display()),
        ))
    })?;
    let template = engine.compile(&source, template_dir.as_deref())?;
    let output = engine.render(&template)?;

    match &args.output {
        Some(path) => std::fs::write(path, output).map_err(Error::IoError)?,
        None => print!("{output}"),
    }
    Ok(())
}
