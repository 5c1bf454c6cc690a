fn main() {
    marchw::run();
}
