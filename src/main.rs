fn main() {
    phonebook::run();
}
