fn main() {
    if let Err(err) = mykad_reader_lib::run() {
        log::error!("MyKad Reader exited with error: {err:#}");
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
