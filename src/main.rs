fn main() {
    if let Err(err) = data_prep::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
