fn main() -> anyhow::Result<()> {
    mood_journal::cli::run()
}
