use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use serde_json::json;

use rollcall_lib::directory::client::CrmClient;
use rollcall_lib::session::AttendanceSession;
use rollcall_lib::state::load_config;
use rollcall_lib::util::parse_date;
use rollcall_lib::{stats, sync, AppState, AttendanceError, ErrorReport};

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(about = "Cohort attendance admin CLI")]
struct Cli {
    /// Config file (defaults to ~/.rollcall/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull new cohorts and students from the CRM directory
    Sync,
    /// List synced cohorts
    Cohorts,
    /// List a cohort's students by CRM cohort id
    Students {
        external_cohort_id: String,
        /// Sync this cohort's students from the CRM first
        #[arg(long, default_value_t = false)]
        refresh: bool,
    },
    /// List a cohort's lessons, newest first
    Lessons { cohort_id: String },
    Lesson {
        #[command(subcommand)]
        command: LessonCommand,
    },
    /// Mark one student for one lesson immediately
    #[command(group(ArgGroup::new("mark").required(true).args(["attended", "absent"])))]
    Mark {
        lesson_id: String,
        student_id: String,
        #[arg(long)]
        attended: bool,
        #[arg(long)]
        absent: bool,
        #[arg(long)]
        note: Option<String>,
    },
    /// Attendance aggregates for a cohort
    Report {
        cohort_id: String,
        /// Restrict to these lesson dates (YYYY-MM-DD)
        #[arg(long = "date", value_parser = parse_date_arg)]
        dates: Vec<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum LessonCommand {
    /// Create lessons, all or nothing
    Add {
        cohort_id: String,
        #[arg(required = true, value_parser = parse_date_arg)]
        dates: Vec<NaiveDate>,
    },
    /// Move a lesson to another date
    Move {
        lesson_id: String,
        #[arg(value_parser = parse_date_arg)]
        date: NaiveDate,
    },
    /// Delete a lesson and its attendance
    Delete { lesson_id: String },
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    parse_date(value).map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => log::error!("Failed to serialize output: {e}"),
    }
}

async fn run(cli: Cli) -> Result<(), AttendanceError> {
    let config = load_config(cli.config.as_deref()).map_err(AttendanceError::Configuration)?;
    let state = AppState::new(config);

    match cli.command {
        Commands::Sync => {
            let client = CrmClient::new(&state.config.crm).map_err(AttendanceError::Configuration)?;
            let summary = sync::sync_all(&state, &client).await?;
            print_json(&json!({ "summary": summary, "message": summary.message() }));
        }
        Commands::Cohorts => {
            print_json(&state.with_db_ref(|db| db.list_cohorts())?);
        }
        Commands::Students {
            external_cohort_id,
            refresh,
        } => {
            let students = if refresh {
                let client =
                    CrmClient::new(&state.config.crm).map_err(AttendanceError::Configuration)?;
                sync::sync_students(&state, &client, &external_cohort_id).await?
            } else {
                sync::students_for_external_cohort(&state, &external_cohort_id)?
            };
            print_json(&students);
        }
        Commands::Lessons { cohort_id } => {
            print_json(&state.with_db_ref(|db| db.list_lessons(&cohort_id))?);
        }
        Commands::Lesson { command } => match command {
            LessonCommand::Add { cohort_id, dates } => {
                let mut session = AttendanceSession::new(&cohort_id);
                print_json(&session.create_lessons(&state, &dates)?);
            }
            LessonCommand::Move { lesson_id, date } => {
                print_json(&state.with_db_ref(|db| db.update_lesson(&lesson_id, date))?);
            }
            LessonCommand::Delete { lesson_id } => {
                state.with_db_ref(|db| db.delete_lesson(&lesson_id))?;
                log::info!("Deleted lesson {lesson_id}");
            }
        },
        Commands::Mark {
            lesson_id,
            student_id,
            attended,
            absent: _,
            note,
        } => {
            let record = state.with_db_ref(|db| {
                db.upsert_attendance(&lesson_id, &student_id, attended, note.as_deref())
            })?;
            print_json(&record);
        }
        Commands::Report { cohort_id, dates } => {
            let mut session = AttendanceSession::new(&cohort_id);
            session.set_selected_dates(dates);
            session.load(&state)?;
            let sheet = session.sheet();
            print_json(&json!({
                "lessons": stats::lesson_series(&sheet),
                "students": stats::student_rates(&sheet),
            }));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            let report = ErrorReport::from(&e);
            match serde_json::to_string(&report) {
                Ok(s) => eprintln!("{s}"),
                Err(_) => eprintln!("{}", report.user_message),
            }
            ExitCode::FAILURE
        }
    }
}
