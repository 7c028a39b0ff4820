fn main() -> anyhow::Result<()> {
    if let Err(e) = omrscan::run() {
        eprintln!("omrscan fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
