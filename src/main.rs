use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use chrono::Utc;
use rand::seq::SliceRandom;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cadence::{FsrsParameters, Rating, Scheduler, item, load_parameters, review};

const PARAMS_ENV: &str = "CADENCE_PARAMS";

struct Options {
    paths: Vec<String>,
    params: Option<PathBuf>,
    no_fuzz: bool,
}

fn usage() -> ! {
    eprintln!("Usage: cadence <command> [options] <paths...>");
    eprintln!("Commands:");
    eprintln!("  drill <paths...>     Review due exercises in the terminal");
    eprintln!("  preview <paths...>   Show next intervals for every due exercise");
    eprintln!("Options:");
    eprintln!("  --params <FILE>      JSON parameter overrides (or ${PARAMS_ENV})");
    eprintln!("  --no-fuzz            Disable interval fuzz");
    std::process::exit(1);
}

fn main() {
    // Logs go to stderr so they never interleave with the review prompts
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        usage();
    }

    let opts = parse_options(&args[2..]);
    if opts.paths.is_empty() {
        usage();
    }
    let scheduler = build_scheduler(&opts);

    match args[1].as_str() {
        "drill" => drill(&scheduler, &opts.paths),
        "preview" => preview(&scheduler, &opts.paths),
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            eprintln!("Commands: drill, preview");
            std::process::exit(1);
        }
    }
}

fn parse_options(args: &[String]) -> Options {
    let mut opts = Options {
        paths: Vec::new(),
        params: std::env::var_os(PARAMS_ENV).map(PathBuf::from),
        no_fuzz: false,
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--params" if i + 1 < args.len() => {
                opts.params = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--params" => {
                eprintln!("error: --params requires a file argument");
                std::process::exit(1);
            }
            "--no-fuzz" => {
                opts.no_fuzz = true;
                i += 1;
            }
            _ => {
                opts.paths.push(args[i].clone());
                i += 1;
            }
        }
    }
    opts
}

fn build_scheduler(opts: &Options) -> Scheduler {
    let mut params = match &opts.params {
        Some(path) => match load_parameters(path) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to load parameters from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => FsrsParameters::default(),
    };
    if opts.no_fuzz {
        params.enable_fuzz = false;
    }
    info!(
        retention = params.request_retention,
        maximum_interval = params.maximum_interval,
        enable_fuzz = params.enable_fuzz,
        "scheduler configured"
    );
    match Scheduler::with_parameters(params) {
        Ok(s) => s,
        Err(e) => {
            error!("Invalid parameters: {e}");
            std::process::exit(1);
        }
    }
}

fn load_all(paths: &[String]) -> (Vec<item::Exercise>, Vec<PathBuf>) {
    let files = item::discover_files(paths);
    if files.is_empty() {
        eprintln!("No CSV files found.");
        std::process::exit(1);
    }

    // Track the source file per exercise so states go back where they came from
    let mut all = Vec::new();
    let mut sources = Vec::new();
    for file in &files {
        match item::load_csv(file) {
            Ok(exercises) => {
                for e in exercises {
                    sources.push(file.clone());
                    all.push(e);
                }
            }
            Err(e) => warn!("Skipping file: {e}"),
        }
    }

    if all.is_empty() {
        eprintln!("No exercises found.");
        std::process::exit(1);
    }
    (all, sources)
}

fn preview(scheduler: &Scheduler, paths: &[String]) {
    let (exercises, _) = load_all(paths);
    let now = Utc::now();
    let due = review::filter_due(&exercises, now);
    if due.is_empty() {
        println!("No exercises due for review.");
        return;
    }
    for i in due {
        let exercise = &exercises[i];
        match review::preview(scheduler, exercise, now) {
            Ok(p) => println!(
                "[{}] {}\n    {}",
                exercise.collection,
                review::render_prompt(&exercise.prompt),
                review::preview_line(&p)
            ),
            Err(e) => warn!(id = %exercise.id, "Cannot preview exercise: {e}"),
        }
    }
}

fn drill(scheduler: &Scheduler, paths: &[String]) {
    let (mut all, sources) = load_all(paths);
    let now = Utc::now();

    let summaries = review::collection_summaries(&all, now);
    println!("Collections:");
    for (i, s) in summaries.iter().enumerate() {
        println!("  {}: {} ({} due / {} total)", i + 1, s.name, s.due, s.total);
    }
    println!("  0: All collections");
    println!();

    let selected = prompt_collection_selection(&summaries);

    let due_in_selected: Vec<usize> = review::filter_due(&all, now)
        .into_iter()
        .filter(|&i| selected.is_empty() || selected.contains(&all[i].collection))
        .collect();

    if due_in_selected.is_empty() {
        println!("No exercises due for review.");
        return;
    }

    println!("{} exercises due for review.\n", due_in_selected.len());

    let mut items = review::build_review_items(&all, &due_in_selected);
    items.shuffle(&mut rand::thread_rng());

    let mut counts = [0u32; 4]; // again, hard, good, easy
    let stdin = io::stdin();
    let mut stdin = stdin.lock();

    for (i, item) in items.iter().enumerate() {
        println!("[{}/{}] {}", i + 1, items.len(), item.collection);
        println!();
        println!("{}", item.prompt_display);
        println!();

        print!("Press Enter to reveal...");
        let mut buf = String::new();
        if read_line(&mut stdin, &mut buf) == 0 {
            break;
        }

        println!("{}", item.solution_display);
        println!();

        let review_time = Utc::now();
        match review::preview(scheduler, &all[item.exercise_index], review_time) {
            Ok(p) => println!("{}", review::preview_line(&p)),
            Err(e) => {
                warn!("Skipping exercise {}: {e}", all[item.exercise_index].id);
                continue;
            }
        }

        let rating = loop {
            print!("Rate (1=again, 2=hard, 3=good, 4=easy): ");
            buf.clear();
            if read_line(&mut stdin, &mut buf) == 0 {
                break None;
            }
            match buf.parse::<Rating>() {
                Ok(g) => break Some(g),
                Err(_) => println!("Please enter 1, 2, 3, or 4."),
            }
        };
        let Some(rating) = rating else { break };

        counts[usize::from(rating.value() - 1)] += 1;

        match review::apply_rating(scheduler, &mut all[item.exercise_index], rating, review_time) {
            Ok(result) => println!("Next review in {} day(s).", result.interval),
            Err(e) => warn!("Could not schedule exercise: {e}"),
        }
        println!();
    }

    save_all(&all, &sources);

    println!("Session complete!");
    println!(
        "  Again: {}, Hard: {}, Good: {}, Easy: {}",
        counts[0], counts[1], counts[2], counts[3]
    );
}

/// Flushes the pending prompt, then reads a line. Returns 0 on EOF or error.
fn read_line(stdin: &mut impl BufRead, buf: &mut String) -> usize {
    if let Err(e) = io::stdout().flush() {
        warn!("stdout flush failed: {e}");
    }
    stdin.read_line(buf).unwrap_or_else(|e| {
        warn!("stdin read failed: {e}");
        0
    })
}

fn save_all(all: &[item::Exercise], sources: &[PathBuf]) {
    let mut files_to_save: HashMap<&PathBuf, Vec<usize>> = HashMap::new();
    for (i, source) in sources.iter().enumerate() {
        files_to_save.entry(source).or_default().push(i);
    }

    for (path, indices) in &files_to_save {
        let exercises: Vec<item::Exercise> = indices.iter().map(|&i| all[i].clone()).collect();
        if let Err(e) = item::save_csv(path, &exercises) {
            error!("Error saving {}: {e}", path.display());
        }
    }
}

fn prompt_collection_selection(summaries: &[review::CollectionSummary]) -> Vec<String> {
    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    loop {
        print!("Select collection(s) (comma-separated numbers, or 0 for all): ");
        let mut buf = String::new();
        if read_line(&mut stdin, &mut buf) == 0 {
            return Vec::new();
        }

        let mut selected = Vec::new();
        let mut valid = true;

        for part in buf.trim().split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            match part.parse::<usize>() {
                Ok(0) => return Vec::new(), // all collections
                Ok(n) if n >= 1 && n <= summaries.len() => {
                    selected.push(summaries[n - 1].name.clone());
                }
                _ => {
                    valid = false;
                    break;
                }
            }
        }

        if valid && !selected.is_empty() {
            return selected;
        }
        println!("Invalid selection. Try again.");
    }
}
