fn main() {
    ataxx_engine::protocol::run();
}
