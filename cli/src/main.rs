fn main() {
    parking_fees_cli::run();
}
