fn main() {
    if let Err(e) = benchmp_cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
