use clap::Parser;
use practice_core::model::{Choice, ChoiceId, PackageId, QuestionId, QuestionItem};
use storage::sqlite::SqliteRepository;

/// Fill a practice database with deterministic arithmetic questions.
#[derive(Debug, Parser)]
#[command(name = "seed", version)]
struct Args {
    /// Database URL.
    #[arg(long = "db", env = "PRACTICE_DB_URL", default_value = "sqlite:practice.sqlite3")]
    db_url: String,

    /// Number of questions to write.
    #[arg(long, env = "PRACTICE_SEED_QUESTIONS", default_value_t = 40)]
    questions: u32,

    /// Spread questions round-robin across this many packages (0 leaves them unpackaged).
    #[arg(long, env = "PRACTICE_SEED_PACKAGES", default_value_t = 2)]
    packages: u32,
}

fn build_question(n: u32, packages: u32) -> Result<QuestionItem, practice_core::model::QuestionError> {
    let a = n % 17 + 2;
    let b = n % 11 + 3;
    let sum = a + b;
    let package_id = (packages > 0).then(|| PackageId::new(u64::from((n - 1) % packages + 1)));

    // The correct answer rotates through the four slots.
    let correct_slot = n % 4;
    let choices: Vec<Choice> = (0..4_u32)
        .map(|slot| {
            let value = sum + slot - correct_slot;
            Choice::new(ChoiceId::new(u64::from(slot + 1)), value.to_string())
        })
        .collect();

    QuestionItem::new(
        QuestionId::new(u64::from(n)),
        package_id,
        format!("What is {a} + {b}?"),
        choices,
        ChoiceId::new(u64::from(correct_slot + 1)),
        format!("{a} + {b} = {sum}"),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let repo = SqliteRepository::connect(&args.db_url).await?;
    repo.migrate().await?;

    for n in 1..=args.questions {
        let item = build_question(n, args.packages)?;
        repo.upsert_question(&item).await?;
    }

    println!(
        "Seeded {} questions across {} packages into {}",
        args.questions, args.packages, args.db_url
    );
    Ok(())
}
