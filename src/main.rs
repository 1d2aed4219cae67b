use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use fractal_vj::kernel::formula::Formula;

fn main() -> Result<()> {
    let cfg = fractal_vj::config::Config::parse();
    let level = if cfg.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    if cfg.list {
        for (name, about) in fractal_vj::animations::ANIMATIONS {
            println!("{name:<16} {about}");
        }
        let formulas: Vec<_> = Formula::named_list().collect();
        println!("\nbuilt-in formulas: {}", formulas.join(", "));
        return Ok(());
    }

    fractal_vj::app::run(cfg)
}
