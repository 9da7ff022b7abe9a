//! Operational CLI for the election platform.
//!
//! Everything here is pre-election setup: the admin credential, the student
//! roster and the fixed post set. The server never writes any of these on
//! its own (posts aside, which admins can restore over the API).

use std::fs;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;

use forum::{
    auth::hash_password,
    db::Store,
    utils::{normalize_register_no, sanitize_field},
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// SQLite database path, same as the server's DATABASE_PATH.
    #[arg(long, default_value = "forum.db")]
    database: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the admin account, or reset its password.
    CreateAdmin {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,
    },

    /// Import students from a JSON roster file.
    ImportStudents { roster: String },

    /// Re-seed the fixed post set (idempotent).
    RestorePosts,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RosterRow {
    register_no: String,
    name: String,
    password: String,
    year: String,
    department: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let store = Store::open(&args.database)
        .with_context(|| format!("opening database {}", args.database))?;

    match args.command {
        Command::CreateAdmin { email, password } => create_admin(&store, &email, &password),
        Command::ImportStudents { roster } => import_students(&store, &roster),
        Command::RestorePosts => restore_posts(&store),
    }
}

fn create_admin(store: &Store, email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || password.is_empty() {
        bail!("email and password must not be empty");
    }

    store.upsert_admin(email.trim(), &hash_password(password))?;
    println!("Admin account ready: {}", email.trim());
    Ok(())
}

fn import_students(store: &Store, roster_path: &str) -> Result<()> {
    let raw = fs::read_to_string(roster_path)
        .with_context(|| format!("reading roster {roster_path}"))?;
    let rows: Vec<RosterRow> =
        serde_json::from_str(&raw).context("roster must be a JSON array of students")?;

    let pb = ProgressBar::new(rows.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap()
        .progress_chars("=> "),
    );

    let mut errors = Vec::new();
    let mut imported = 0usize;

    for (index, row) in rows.iter().enumerate() {
        // Roster rows are 1-based for humans.
        let line = index + 1;
        pb.set_message(format!("Importing row {line}"));

        let register_no = normalize_register_no(&row.register_no);
        let name = sanitize_field(&row.name);
        let department = sanitize_field(&row.department);
        let year = sanitize_field(&row.year);

        if register_no.is_empty()
            || name.is_empty()
            || department.is_empty()
            || year.is_empty()
            || row.password.is_empty()
        {
            errors.push(format!("Row {line}: Missing required fields"));
            pb.inc(1);
            continue;
        }

        match store.insert_student(
            &register_no,
            &name,
            &department,
            &year,
            &hash_password(&row.password),
        ) {
            Ok(_) => imported += 1,
            Err(e) => errors.push(format!("Row {line}: {e}")),
        }

        pb.inc(1);
    }

    pb.finish_with_message("Done");

    println!("\nImported {imported} of {} students", rows.len());
    if !errors.is_empty() {
        println!("Errors:");
        for error in &errors {
            println!("  {error}");
        }
    }

    Ok(())
}

fn restore_posts(store: &Store) -> Result<()> {
    let posts = store.seed_posts()?;

    println!("Posts restored:");
    for post in posts {
        println!("  {}. {}", post.order, post.name);
    }
    Ok(())
}
