use std::process;
use std::time::Duration;

use tracing::error;
use tracing_subscriber::EnvFilter;

use fanbench::{
    AggregationMode, EndpointConfig, FieldOrder, HarnessConfig, RampController, RampStrategy,
};

struct CliOptions {
    config: HarnessConfig,
    json: bool,
}

fn print_help() {
    println!("Fan-out latency benchmark");
    println!();
    println!("USAGE:");
    println!("    fanbench <ADDRESS> <PROJECT> <SECRET> [CLIENTS] [OPTIONS]");
    println!();
    println!("ARGS:");
    println!("    <ADDRESS>   Endpoint, host:port or ws://host:port/path");
    println!("    <PROJECT>   Project identifier");
    println!("    <SECRET>    Shared secret for token derivation");
    println!("    [CLIENTS]   Fixed subscriber count [default: 1]");
    println!();
    println!("OPTIONS:");
    println!("        --max <N>            Ramp up to N subscribers (with --step)");
    println!("        --step <K>           Ramp increment [default: 1]");
    println!("    -r, --repeats <N>        Rounds per population level [default: 100]");
    println!("        --mode <MODE>        Aggregation: average | tail [default: average]");
    println!("    -u, --user <ID>          User identifier [default: bench]");
    println!("    -n, --namespace <NS>     Namespace [default: test]");
    println!("    -c, --channel <CH>       Channel [default: test]");
    println!("        --origin <ORIGIN>    Origin header [default: http://localhost/]");
    println!("        --path <PATH>        Upgrade request path (overrides URL path)");
    println!("        --data <JSON>        Publish body [default: probe text]");
    println!("        --acks <N>           Ack frames drained per publish [default: 2]");
    println!("        --token-order <O>    project-user | user-project [default: project-user]");
    println!("        --timestamp <TS>     Token timestamp (older endpoints omit it)");
    println!("        --pacing-ms <MS>     Settle delay before each round [default: 100]");
    println!("        --stagger-ms <MS>    Delay between subscriber spawns [default: 100]");
    println!("        --backoff-ms <MS>    Dial retry backoff [default: 1000]");
    println!("        --deadline-ms <MS>   Per-wait deadline, 0 = block forever [default: 30000]");
    println!("    -j, --json               One JSON object per level instead of rows");
    println!("        --help               Show this help");
    println!();
    println!("EXAMPLES:");
    println!("    # 10 subscribers, 100 rounds, mean fan-out latency");
    println!("    fanbench ws://127.0.0.1:8000/connection development secret 10");
    println!();
    println!("    # Ramp by 5 up to 50, tail latency, 20 rounds per level");
    println!("    fanbench 127.0.0.1:8000 development secret --max 50 --step 5 \\");
    println!("        --repeats 20 --mode tail");
}

/// Split `host:port` or a `ws://host:port/path` URL into address and path.
fn parse_endpoint(raw: &str) -> (String, String) {
    let stripped = raw.strip_prefix("ws://").unwrap_or(raw);
    match stripped.split_once('/') {
        Some((address, path)) => (address.to_string(), format!("/{path}")),
        None => (stripped.to_string(), "/".to_string()),
    }
}

fn bad_usage(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!("Run with --help for usage.");
    process::exit(2);
}

fn parse_args() -> CliOptions {
    let args: Vec<String> = std::env::args().collect();

    let mut positional: Vec<String> = Vec::new();
    let mut max: Option<usize> = None;
    let mut step: usize = 1;
    let mut repeats: usize = 100;
    let mut mode = AggregationMode::Average;
    let mut user = "bench".to_string();
    let mut namespace = "test".to_string();
    let mut channel = "test".to_string();
    let mut origin = "http://localhost/".to_string();
    let mut path_override: Option<String> = None;
    let mut data: Option<String> = None;
    let mut acks: usize = 2;
    let mut token_order = FieldOrder::ProjectThenUser;
    let mut timestamp: Option<String> = None;
    let mut pacing_ms: u64 = 100;
    let mut stagger_ms: u64 = 100;
    let mut backoff_ms: u64 = 1000;
    let mut deadline_ms: u64 = 30_000;
    let mut json = false;

    let take_value = |i: &mut usize, args: &[String]| -> String {
        *i += 1;
        match args.get(*i) {
            Some(value) => value.clone(),
            None => bad_usage(&format!("{} expects a value", args[*i - 1])),
        }
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--max" => max = Some(parse_number(&take_value(&mut i, &args), "--max")),
            "--step" => step = parse_number(&take_value(&mut i, &args), "--step"),
            "-r" | "--repeats" => repeats = parse_number(&take_value(&mut i, &args), "--repeats"),
            "--mode" => {
                mode = match take_value(&mut i, &args).as_str() {
                    "average" | "avg" => AggregationMode::Average,
                    "tail" => AggregationMode::Tail,
                    other => bad_usage(&format!("unknown mode '{other}'")),
                }
            }
            "-u" | "--user" => user = take_value(&mut i, &args),
            "-n" | "--namespace" => namespace = take_value(&mut i, &args),
            "-c" | "--channel" => channel = take_value(&mut i, &args),
            "--origin" => origin = take_value(&mut i, &args),
            "--path" => path_override = Some(take_value(&mut i, &args)),
            "--data" => data = Some(take_value(&mut i, &args)),
            "--acks" => acks = parse_number(&take_value(&mut i, &args), "--acks"),
            "--token-order" => {
                token_order = match take_value(&mut i, &args).as_str() {
                    "project-user" => FieldOrder::ProjectThenUser,
                    "user-project" => FieldOrder::UserThenProject,
                    other => bad_usage(&format!("unknown token order '{other}'")),
                }
            }
            "--timestamp" => timestamp = Some(take_value(&mut i, &args)),
            "--pacing-ms" => pacing_ms = parse_number(&take_value(&mut i, &args), "--pacing-ms"),
            "--stagger-ms" => stagger_ms = parse_number(&take_value(&mut i, &args), "--stagger-ms"),
            "--backoff-ms" => backoff_ms = parse_number(&take_value(&mut i, &args), "--backoff-ms"),
            "--deadline-ms" => {
                deadline_ms = parse_number(&take_value(&mut i, &args), "--deadline-ms");
            }
            "-j" | "--json" => json = true,
            "--help" => {
                print_help();
                process::exit(0);
            }
            flag if flag.starts_with('-') => bad_usage(&format!("unknown option '{flag}'")),
            value => positional.push(value.to_string()),
        }
        i += 1;
    }

    if positional.len() < 3 {
        bad_usage("expected <ADDRESS> <PROJECT> <SECRET>");
    }
    let (address, url_path) = parse_endpoint(&positional[0]);

    let mut endpoint = EndpointConfig::new(address, positional[1].clone(), positional[2].clone());
    endpoint.path = path_override.unwrap_or(url_path);
    endpoint.origin = origin;
    endpoint.user = user;
    endpoint.namespace = namespace;
    endpoint.channel = channel;
    endpoint.token_order = token_order;
    endpoint.token_timestamp = timestamp;
    if let Some(raw) = data {
        endpoint.payload = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => bad_usage(&format!("--data is not valid JSON: {err}")),
        };
    }

    let schedule = match max {
        Some(max) => RampStrategy::Linear { max, step },
        None => RampStrategy::Fixed {
            clients: positional
                .get(3)
                .map(|raw| parse_number(raw, "CLIENTS"))
                .unwrap_or(1),
        },
    };

    let mut config = HarnessConfig::new(endpoint)
        .with_schedule(schedule)
        .with_repeats(repeats)
        .with_mode(mode);
    config.pacing = Duration::from_millis(pacing_ms);
    config.stagger = Duration::from_millis(stagger_ms);
    config.retry_backoff = Duration::from_millis(backoff_ms);
    config.deadline = (deadline_ms > 0).then(|| Duration::from_millis(deadline_ms));
    config.publish_acks = acks;

    CliOptions { config, json }
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> T {
    match raw.parse() {
        Ok(value) => value,
        Err(_) => bad_usage(&format!("{what}: '{raw}' is not a valid number")),
    }
}

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout carries only the result rows.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let options = parse_args();
    let json = options.json;

    let outcome = RampController::new(options.config)
        .run(|report| {
            if json {
                match serde_json::to_string(report) {
                    Ok(line) => println!("{line}"),
                    Err(err) => error!(%err, "failed to render report"),
                }
            } else {
                println!("{} {:.3}", report.clients, report.average_ms());
            }
        })
        .await;

    if let Err(err) = outcome {
        error!(%err, "benchmark aborted");
        process::exit(1);
    }
}
