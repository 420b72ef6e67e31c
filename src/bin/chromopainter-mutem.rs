fn main() {
    chromopainter_mutem::cli::main();
}
