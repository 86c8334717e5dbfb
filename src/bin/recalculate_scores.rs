//! On-demand score recalculation, for when the hourly pass isn't soon enough.

use async_tourney_bot::db::{raw_diesel_cxn_from_env, run_migrations};
use async_tourney_bot::models::tournaments::Tournament;
use async_tourney_bot::scoring::calculate_tournament_scores;
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    /// tournament id; omit to score every active tournament
    #[arg(long)]
    tournament: Option<i32>,

    /// restrict scoring to runs that passed review
    #[arg(long, default_value_t = false)]
    only_approved: bool,
}

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    let mut conn = raw_diesel_cxn_from_env()?;
    run_migrations(&mut conn).map_err(|e| anyhow::anyhow!("{e}"))?;

    let tournaments = match args.tournament {
        Some(id) => vec![Tournament::get_by_id(id, &mut conn)?
            .ok_or(anyhow::anyhow!("No tournament with id {id}"))?],
        None => Tournament::get_active(&mut conn)?,
    };
    for t in tournaments {
        println!("Scoring tournament {} ({})", t.id, t.name);
        calculate_tournament_scores(&t, args.only_approved, &mut conn)?;
    }
    Ok(())
}
