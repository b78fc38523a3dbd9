use simplelog::{ColorChoice, LevelFilter, TermLogger, TerminalMode};

pub fn init() {
    let filter = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    // only fails when a logger is already installed
    let _ = TermLogger::init(
        filter,
        simplelog::Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}
