fn main() {
    if let Err(err) = rhc_warehouse::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
