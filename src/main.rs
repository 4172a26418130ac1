fn main() {
    wfm_sync::cli::run();
}
