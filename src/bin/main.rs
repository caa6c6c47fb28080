fn main() {
  bulletin_wallet::main();
}
