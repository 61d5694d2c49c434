mod cdx;
mod cli;
mod commands;
mod env_loader;
mod error;
mod logging;

fn main() {
    env_loader::load_dotenv();
    logging::init();

    let code = cli::run();
    std::process::exit(code.as_i32());
}
