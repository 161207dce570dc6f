/// Initializes `env_logger`. Warnings such as unknown filters are always
/// shown; verbose output also traces node extraction, compilation and
/// context switches.
pub fn init_logger(verbose: bool) {
    env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Trace
        } else {
            log::LevelFilter::Warn
        })
        .init();
}
