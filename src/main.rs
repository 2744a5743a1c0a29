fn main() {
    vcfr::cli::run();
}
