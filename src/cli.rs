use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use log::LevelFilter;

use crate::config::SolverConfig;
use crate::display::{board_display, print_error, print_section, print_success, strategy_table, summary_table};
use crate::error::{CfrError, CfrResult};
use crate::game::GameSpec;
use crate::game_tree::{GameTree, NodeId};
use crate::solver::Solver;
use crate::strategy::StrategyReader;

#[derive(Parser)]
#[command(name = "vcfr", version, about = "Vectorized CFR solver for small limit card games.")]
struct Cli {
    /// Log progress (repeat for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preset {
    Kuhn,
    Leduc,
}

#[derive(clap::Args)]
struct GameArgs {
    /// Built-in game
    #[arg(short, long, default_value = "kuhn")]
    game: Preset,
    /// JSON game spec; overrides --game
    #[arg(long)]
    spec: Option<PathBuf>,
    /// JSON solver config
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl GameArgs {
    fn load(&self) -> CfrResult<(GameSpec, SolverConfig)> {
        let spec = match &self.spec {
            Some(path) => GameSpec::from_file(path)?,
            None => match self.game {
                Preset::Kuhn => GameSpec::kuhn(),
                Preset::Leduc => GameSpec::leduc(),
            },
        };
        let config = match &self.config {
            Some(path) => SolverConfig::from_file(path)?,
            None => SolverConfig::default(),
        };
        Ok((spec, config))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run CFR iterations and report value and exploitability
    Solve {
        #[command(flatten)]
        game: GameArgs,
        /// Number of iterations
        #[arg(short = 'n', long, default_value = "1000")]
        iterations: u64,
        /// Worker threads; overrides the config
        #[arg(short, long)]
        threads: Option<usize>,
        /// Directory to save regrets and sumprobs into
        #[arg(long)]
        save: Option<PathBuf>,
        /// Print the first-street average strategy
        #[arg(long)]
        show: bool,
    },
    /// Print the first-street average strategy of a saved run
    Show {
        #[command(flatten)]
        game: GameArgs,
        /// Directory holding the saved files
        #[arg(long)]
        dir: PathBuf,
        /// Iteration the files were saved at
        #[arg(short, long)]
        iteration: u64,
    },
}

pub fn run() {
    run_with_args(std::env::args().collect());
}

pub fn run_with_args(args: Vec<String>) {
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);
    if let Err(e) = dispatch(cli.command) {
        print_error(&e.to_string());
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Info);
        }
        2 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    let _ = builder.try_init();
}

fn dispatch(command: Commands) -> CfrResult<()> {
    match command {
        Commands::Solve {
            game,
            iterations,
            threads,
            save,
            show,
        } => cmd_solve(&game, iterations, threads, save, show),
        Commands::Show { game, dir, iteration } => cmd_show(&game, dir, iteration),
    }
}

fn cmd_solve(
    args: &GameArgs,
    iterations: u64,
    threads: Option<usize>,
    save: Option<PathBuf>,
    show: bool,
) -> CfrResult<()> {
    let (spec, mut config) = args.load()?;
    if let Some(t) = threads {
        config.threads = t;
    }

    println!();
    println!(
        "  Solving {}: {} iterations on {} thread(s)...",
        spec.game.name.bold(),
        iterations,
        config.threads
    );

    let start = Instant::now();
    let mut solver = Solver::new(&spec, config)?;
    solver.run(iterations)?;
    let elapsed = start.elapsed().as_secs_f64();

    let value = solver.game_value();
    let exploitability = solver.exploitability();
    print_section("Result", &summary_table(solver.iteration(), value, exploitability, elapsed));

    if let Some(dir) = save {
        solver.save(&dir)?;
        print_success(&format!("  Saved iteration {} to {}", solver.iteration(), dir.display()));
    }
    if show {
        print_first_street(&solver)?;
    }
    Ok(())
}

fn cmd_show(args: &GameArgs, dir: PathBuf, iteration: u64) -> CfrResult<()> {
    let (spec, mut config) = args.load()?;
    config.threads = 1;
    let mut solver = Solver::new(&spec, config)?;
    solver.load_sumprobs(&dir, iteration)?;
    print_first_street(&solver)
}

/// Decision nodes of the root street with the action line leading to each.
fn root_street_lines(tree: &GameTree) -> Vec<(NodeId, String)> {
    let street = tree.street(tree.root());
    let mut out = Vec::new();
    let mut stack = vec![(tree.root(), Vec::<String>::new())];
    while let Some((n, line)) = stack.pop() {
        if tree.is_terminal(n) || tree.street(n) != street {
            continue;
        }
        if tree.num_successors(n) > 1 {
            let label = if line.is_empty() {
                "root".to_string()
            } else {
                line.join(" ")
            };
            out.push((n, label));
        }
        for i in (0..tree.num_successors(n)).rev() {
            let mut next = line.clone();
            next.push(tree.action(n, i).to_string());
            stack.push((tree.successor(n, i), next));
        }
    }
    out
}

fn print_first_street(solver: &Solver) -> CfrResult<()> {
    let ctx = solver.context();
    let deck = &ctx.game.deck;
    let street = ctx.root_street;
    let board = ctx.index.canonical_board(street, ctx.root_board).to_vec();
    let reader = StrategyReader::new(ctx, solver.sumprobs());
    let hands = ctx.index.board_hands(&board);

    for (node, line) in root_street_lines(&ctx.tree) {
        let player = ctx.tree.player_acting(node);
        let mut rows = Vec::with_capacity(hands.len());
        let mut actions = Vec::new();
        for hand in &hands {
            let hole: Vec<_> = hand.iter().copied().filter(|c| !c.is_none()).collect();
            let result = reader.strategy(node, &board, &hole)?;
            actions = result.actions;
            rows.push((deck.format_cards(&hole), result.frequencies));
        }
        if actions.is_empty() {
            return Err(CfrError::Invariant(format!("node {} has no actions", node)));
        }
        let title = format!(
            "P{} after {} (board {})",
            player + 1,
            line,
            board_display(deck, &board)
        );
        print_section(&title, &strategy_table(&actions, &rows));
    }
    Ok(())
}
