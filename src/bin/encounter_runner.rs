//! Headless Encounter Runner
//!
//! Plays a seeded skirmish between a party and a band of hostiles through the
//! public combat API and prints a JSON (or text) summary.

use std::path::PathBuf;

use clap::Parser;
use rand::Rng;
use serde::Serialize;
use vtt_combat::battle::{
    find_path_with, grid_to_world, ActionPipeline, AttackContext, BattleGrid, CombatStateMachine,
    CombatToken, LogAction, MoveContext, MovementRules, Terrain, Weapon,
};
use vtt_combat::core::{CombatConfig, GridCoord, Result};
use vtt_combat::dice::ChaChaSource;

/// Headless Encounter Runner - seeded party vs hostiles skirmish
#[derive(Parser, Debug)]
#[command(name = "encounter_runner")]
#[command(about = "Run a seeded skirmish through the combat core and print a summary")]
struct Args {
    /// Combat config TOML file (defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Map width in cells
    #[arg(long, default_value_t = 16)]
    width: u32,

    /// Map height in cells
    #[arg(long, default_value_t = 12)]
    height: u32,

    /// Number of party members
    #[arg(long, default_value_t = 3)]
    party: u32,

    /// Number of hostiles
    #[arg(long, default_value_t = 4)]
    hostiles: u32,

    /// Random seed for deterministic runs
    #[arg(long)]
    seed: Option<u64>,

    /// Rounds before the encounter is called a draw
    #[arg(long, default_value_t = 20)]
    max_rounds: u32,

    /// Output format: json or text
    #[arg(long, default_value = "json")]
    format: String,

    /// Print the combat log to stderr
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Serialize)]
struct Survivor {
    id: String,
    name: String,
    hp: u32,
    max_hp: u32,
    party: bool,
}

/// JSON output structure
#[derive(Serialize)]
struct EncounterResult {
    outcome: String,
    rounds: u32,
    attacks: usize,
    hits: usize,
    total_damage: u32,
    defeated: usize,
    cells_revealed: usize,
    survivors: Vec<Survivor>,
    seed: u64,
}

fn main() {
    let args = Args::parse();

    let default_directive = if args.verbose {
        "vtt_combat=debug"
    } else {
        "vtt_combat=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive)),
        )
        .with_writer(std::io::stderr)
        .init();

    let seed = args.seed.unwrap_or_else(rand::random);

    match run(&args, seed) {
        Ok(result) => print_result(&result, &args.format),
        Err(e) => {
            eprintln!("Encounter failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn run(args: &Args, seed: u64) -> Result<EncounterResult> {
    let config = match &args.config {
        Some(path) => CombatConfig::load(path)?,
        None => CombatConfig::default(),
    };

    let grid = build_grid(args.width.max(4), args.height.max(2), config.tile_size, seed);
    let roster = build_roster(args.party, args.hostiles, &grid);

    let mut machine = CombatStateMachine::new(format!("skirmish-{}", seed), grid, config)?
        .with_random_source(ChaChaSource::seed_from_u64(seed));
    machine.start_combat(roster)?;

    let outcome = loop {
        if let Some(winner) = winner(&machine) {
            break winner;
        }
        if machine.round() > args.max_rounds {
            break "draw".to_string();
        }
        take_turn(&mut machine)?;
    };
    machine.end_combat()?;

    if args.verbose {
        for entry in machine.log().entries() {
            eprintln!("  [round {}] {}", entry.round, entry.description);
        }
    }

    Ok(summarize(&machine, outcome, seed))
}

/// Open field with scattered walls and rough ground; the outer two columns on
/// each side stay clear for deployment
fn build_grid(width: u32, height: u32, tile_size: f32, seed: u64) -> BattleGrid {
    let mut terrain_rng = ChaChaSource::seed_from_u64(seed.wrapping_add(1));
    let rng = terrain_rng.rng_mut();
    let mut grid = BattleGrid::new(width, height, tile_size);

    for z in 0..height as i32 {
        for x in 2..(width as i32 - 2) {
            let roll: f32 = rng.gen();
            let coord = GridCoord::new(x, z);
            if roll < 0.08 {
                grid.set_terrain(coord, Terrain::Wall);
            } else if roll < 0.16 {
                grid.set_terrain(coord, Terrain::Difficult);
            }
        }
    }
    grid
}

fn build_roster(party: u32, hostiles: u32, grid: &BattleGrid) -> Vec<CombatToken> {
    let tile = grid.tile_size;
    let rows = grid.height.max(1);
    let mut roster = Vec::new();

    for i in 0..party {
        let cell = GridCoord::new((i / rows) as i32, (i % rows) as i32);
        roster.push(
            CombatToken::new(
                format!("hero-{}", i + 1),
                format!("Hero {}", i + 1),
                grid_to_world(cell, tile),
                24,
                15,
                6,
            )
            .with_initiative_modifier(2)
            .player(),
        );
    }
    for i in 0..hostiles {
        let cell = GridCoord::new(
            grid.width as i32 - 1 - (i / rows) as i32,
            (i % rows) as i32,
        );
        roster.push(CombatToken::new(
            format!("goblin-{}", i + 1),
            format!("Goblin {}", i + 1),
            grid_to_world(cell, tile),
            9,
            13,
            6,
        ));
    }
    roster
}

fn weapon_for(token: &CombatToken) -> Weapon {
    if token.is_player {
        Weapon::new("Longsword", "1d8+3")
            .with_attack_bonus(5)
            .with_range(7.5)
    } else {
        Weapon::new("Scimitar", "1d6+2")
            .with_attack_bonus(4)
            .with_range(7.5)
    }
}

fn winner(machine: &CombatStateMachine) -> Option<String> {
    let party_alive = machine.entities().iter().any(|t| t.is_player && t.is_alive());
    let hostiles_alive = machine.entities().iter().any(|t| !t.is_player && t.is_alive());
    match (party_alive, hostiles_alive) {
        (true, true) => None,
        (true, false) => Some("party".to_string()),
        (false, true) => Some("hostiles".to_string()),
        (false, false) => Some("draw".to_string()),
    }
}

/// Approach the nearest foe, strike if in reach, then pass the turn
fn take_turn(machine: &mut CombatStateMachine) -> Result<()> {
    let Some(actor) = machine.current_entity().cloned() else {
        return Ok(());
    };
    let tile = machine.grid().tile_size;
    let here = actor.grid_position(tile);

    let Some(foe) = machine
        .entities()
        .iter()
        .filter(|t| t.is_player != actor.is_player && t.is_alive())
        .min_by_key(|t| t.grid_position(tile).chebyshev(&here))
        .cloned()
    else {
        return machine.end_turn(&actor.id);
    };

    let attack = AttackContext::new(actor.id.clone(), foe.id.clone(), weapon_for(&actor));
    let in_reach = |machine: &CombatStateMachine| {
        ActionPipeline::new(machine.grid(), machine.config())
            .check_attack(machine.entities(), &attack)
            .is_ok()
    };

    if !in_reach(&*machine) {
        if let Some(path) = approach_path(machine, &actor, &foe) {
            machine.move_entity(&MoveContext::new(actor.id.clone(), path))?;
        }
    }

    if in_reach(&*machine) {
        machine.use_action(&attack)?;
    }

    // The actor may have been removed by its own action
    if machine.current_turn().map(|e| &e.token_id) == Some(&actor.id) {
        machine.end_turn(&actor.id)?;
    }
    Ok(())
}

/// Path toward `foe` within the actor's remaining movement, stopping short of
/// the foe and of any occupied cell
fn approach_path(
    machine: &CombatStateMachine,
    actor: &CombatToken,
    foe: &CombatToken,
) -> Option<Vec<GridCoord>> {
    let tile = machine.grid().tile_size;
    let rules = MovementRules::from_config(machine.config());
    let start = actor.grid_position(tile);
    let goal = foe.grid_position(tile);

    let mut path = find_path_with(machine.grid(), start, goal, &rules)?;
    path.pop();

    let budget = machine.remaining_movement(&actor.id).unwrap_or(0) as usize;
    path.truncate(budget + 1);

    let occupied = |cell: &GridCoord| {
        machine
            .entities()
            .iter()
            .any(|t| t.id != actor.id && t.grid_position(tile) == *cell)
    };
    while path.len() > 1 && path.last().map_or(false, |cell| occupied(cell)) {
        path.pop();
    }

    (path.len() > 1).then_some(path)
}

fn summarize(machine: &CombatStateMachine, outcome: String, seed: u64) -> EncounterResult {
    let attacks: Vec<_> = machine
        .log()
        .entries()
        .filter(|e| e.action == LogAction::Attack)
        .collect();
    let hits = attacks.iter().filter(|e| e.damage.is_some()).count();
    let total_damage = attacks.iter().filter_map(|e| e.damage).sum();
    let defeated = machine
        .log()
        .entries()
        .filter(|e| e.action == LogAction::Defeated)
        .count();
    let cells_revealed = machine
        .fog()
        .map(machine.map_id())
        .map(|m| m.revealed_count())
        .unwrap_or(0);

    EncounterResult {
        outcome,
        rounds: machine.round(),
        attacks: attacks.len(),
        hits,
        total_damage,
        defeated,
        cells_revealed,
        survivors: machine
            .entities()
            .iter()
            .map(|t| Survivor {
                id: t.id.to_string(),
                name: t.name.clone(),
                hp: t.hp,
                max_hp: t.max_hp,
                party: t.is_player,
            })
            .collect(),
        seed,
    }
}

fn print_result(result: &EncounterResult, format: &str) {
    match format {
        "text" => {
            println!("Encounter Result");
            println!("================");
            println!("Outcome: {}", result.outcome);
            println!("Rounds: {}", result.rounds);
            println!(
                "Attacks: {} ({} hits, {} damage)",
                result.attacks, result.hits, result.total_damage
            );
            println!("Defeated: {}", result.defeated);
            println!("Cells revealed: {}", result.cells_revealed);
            println!();
            for s in &result.survivors {
                let side = if s.party { "party" } else { "hostile" };
                println!("  {} [{}] {}/{}", s.name, side, s.hp, s.max_hp);
            }
            println!();
            println!("Seed: {}", result.seed);
        }
        other => {
            if other != "json" {
                eprintln!("Unknown format '{}', defaulting to json", other);
            }
            match serde_json::to_string_pretty(result) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("Failed to serialize result: {}", e),
            }
        }
    }
}
