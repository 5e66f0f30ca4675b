fn main() {
    bot_tournament_shell_lib::run();
}
