fn main() {
    notes_core::logging::init();

    if let Err(e) = notes_core::run(std::env::args().skip(1)) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
