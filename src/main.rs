use std::env;

use colored::*;

use watchexpr::{logging, CachePolicy, Config, Environment, ErrorPrinter, ExpressionCache, FlatEnvironment, Parser};

fn main() {
    let config = Config::from_env();
    logging::init(&config);

    let args: Vec<String> = env::args().skip(1).collect();
    tracing::info!("evaluating {} expressions", args.len());

    let environment = FlatEnvironment::with_config(&config);
    let cache = ExpressionCache::new();
    let parser = Parser::new(&cache);

    let mut failed = false;

    for arg in args.iter() {
        let term = match parser.try_compile(arg) {
            Ok(term) => term,
            Err(e) => {
                eprintln!("{}", ErrorPrinter {}.contextualize(arg, &e));
                failed = true;
                continue;
            }
        };

        match term.evaluate(CachePolicy::UseNonVolatiles, &environment) {
            Ok(value) => println!(
                "{} = {} {}",
                term.to_string().bold(),
                value.to_string().bright_green(),
                format!("({})", value.type_name(environment.type_info())).blue()
            ),
            Err(e) => {
                eprintln!("{}: {} {}", "error".bold().bright_red(), term, e);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}
