fn main() {
    hourdash::run();
}
