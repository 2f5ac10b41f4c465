//! Lectern CLI - course progression from the command line.

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use lectern_catalog::{BasicCatalogManager, CatalogManager, CourseSpec, LecturePatch, ModulePatch};
use lectern_core::{Actor, CourseId, CoursePatch, EnrollmentId, LectureId, ModuleId, UserId};
use lectern_progress::{EnrollmentController, LifecycleConfig, Traversal};
use lectern_storage::{EnrollmentFilter, JsonStorage, Storage};
#[cfg(feature = "sqlite")]
use lectern_storage::SqliteStorage;

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Progressive course unlocking and progress tracking", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage path for Lectern data
    #[arg(short, long, global = true, default_value = ".lectern")]
    storage: PathBuf,

    /// How the next lecture is chosen: exact or sorted
    #[arg(long, global = true, default_value = "exact")]
    traversal: Traversal,

    /// Only allow completing lectures that are unlocked
    #[arg(long, global = true)]
    require_unlocked: bool,

    /// Acting user
    #[arg(short, long, global = true, default_value = "guest")]
    user: String,

    /// Act with elevated privilege
    #[arg(long, global = true)]
    admin: bool,

    /// Keep data in a SQLite database inside the storage directory
    #[cfg(feature = "sqlite")]
    #[arg(long, global = true)]
    sqlite: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage courses
    #[command(subcommand)]
    Course(CourseCommand),

    /// Manage modules
    #[command(subcommand)]
    Module(ModuleCommand),

    /// Manage lectures
    #[command(subcommand)]
    Lecture(LectureCommand),

    /// Enroll the acting user in a course
    Enroll {
        /// Course ID
        course: CourseId,
    },

    /// Mark a lecture completed
    Complete {
        /// Lecture ID
        lecture: LectureId,
        /// Enrollment to complete it in (defaults to the acting user's)
        #[arg(long)]
        enrollment: Option<EnrollmentId>,
    },

    /// Clear an enrollment's progress (admin)
    Reset {
        /// Enrollment ID
        enrollment: EnrollmentId,
    },

    /// Show the acting user's progress in a course
    Progress {
        /// Course ID
        course: CourseId,
        /// Recompute against the current catalog first
        #[arg(long)]
        recalculate: bool,
    },

    /// List enrollments (all matching with --admin, otherwise your own)
    Enrollments {
        /// Filter by course
        #[arg(long)]
        course: Option<CourseId>,
        /// Filter by user (admin only)
        #[arg(long = "of")]
        of_user: Option<String>,
    },

    /// Leave a course
    Unenroll {
        /// Enrollment ID
        enrollment: EnrollmentId,
    },
}

#[derive(Subcommand)]
enum CourseCommand {
    /// Add a new course
    Add {
        /// Course title
        title: String,
        /// Description
        #[arg(long, default_value = "")]
        description: String,
        /// Price
        #[arg(long, default_value = "0")]
        price: f64,
        /// Thumbnail image path
        #[arg(long)]
        thumbnail: Option<String>,
    },
    /// List courses
    List,
    /// Show a course outline
    Show {
        /// Course ID
        id: CourseId,
    },
    /// Update course fields
    Update {
        /// Course ID
        id: CourseId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        price: Option<f64>,
        #[arg(long)]
        thumbnail: Option<String>,
    },
    /// Delete a course with everything in it
    Delete {
        /// Course ID
        id: CourseId,
    },
}

#[derive(Subcommand)]
enum ModuleCommand {
    /// Append a module to a course
    Add {
        /// Course ID
        course: CourseId,
        /// Module title
        title: String,
    },
    /// Rename or renumber a module
    Update {
        /// Module ID
        id: ModuleId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        number: Option<u32>,
    },
    /// Renumber several modules at once
    Renumber {
        /// Course ID
        course: CourseId,
        /// Assignments as MODULE_ID=NUMBER
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(ModuleId, u32)>,
    },
    /// Delete a module and its lectures
    Delete {
        /// Module ID
        id: ModuleId,
    },
}

#[derive(Subcommand)]
enum LectureCommand {
    /// Append a lecture to a module
    Add {
        /// Module ID
        module: ModuleId,
        /// Lecture title
        title: String,
        /// Video URL
        video_url: String,
    },
    /// Show a lecture, if unlocked for the acting user
    Show {
        /// Lecture ID
        id: LectureId,
    },
    /// Update lecture fields
    Update {
        /// Lecture ID
        id: LectureId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        order: Option<u32>,
        #[arg(long)]
        video_url: Option<String>,
    },
    /// Delete a lecture
    Delete {
        /// Lecture ID
        id: LectureId,
    },
}

fn parse_assignment(s: &str) -> std::result::Result<(ModuleId, u32), String> {
    let (id, number) = s
        .split_once('=')
        .ok_or_else(|| format!("expected MODULE_ID=NUMBER, got '{}'", s))?;
    let id = id.parse().map_err(|e| format!("invalid module ID '{}': {}", id, e))?;
    let number = number
        .parse()
        .map_err(|e| format!("invalid module number '{}': {}", number, e))?;
    Ok((id, number))
}

fn init_logging(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    #[cfg(feature = "sqlite")]
    if cli.sqlite {
        tokio::fs::create_dir_all(&cli.storage).await?;
        let path = cli.storage.join("lectern.db");
        let storage = SqliteStorage::new_from_path(&path)
            .await
            .with_context(|| format!("opening database at {}", path.display()))?;
        debug!("Using SQLite database at {}", path.display());
        return run(cli, Arc::new(storage)).await;
    }

    let storage = JsonStorage::new(&cli.storage)
        .await
        .with_context(|| format!("opening storage at {}", cli.storage.display()))?;
    debug!("Using JSON storage at {}", storage.root().display());
    run(cli, Arc::new(storage)).await
}

async fn run<S: Storage + 'static>(cli: Cli, storage: Arc<S>) -> Result<()> {
    let actor = if cli.admin {
        Actor::admin(cli.user.clone())
    } else {
        Actor::user(cli.user.clone())
    };
    let catalog = BasicCatalogManager::new(storage.clone());
    let enrollments = EnrollmentController::new(storage).with_config(LifecycleConfig {
        traversal: cli.traversal,
        require_unlocked: cli.require_unlocked,
    });

    match cli.command {
        Commands::Course(command) => run_course(&catalog, command).await?,
        Commands::Module(command) => run_module(&catalog, command).await?,
        Commands::Lecture(command) => run_lecture(&catalog, &actor, command).await?,
        Commands::Enroll { course } => {
            print_json(&enrollments.enroll(&actor, course).await?)?;
        }
        Commands::Complete { lecture, enrollment } => {
            let completion = match enrollment {
                Some(id) => enrollments.complete_lecture(&actor, id, lecture).await?,
                None => enrollments.complete_lecture_for_user(&actor, lecture).await?,
            };
            print_json(&completion)?;
        }
        Commands::Reset { enrollment } => {
            print_json(&enrollments.reset_progress(&actor, enrollment).await?)?;
        }
        Commands::Progress { course, recalculate } => {
            let enrollment = enrollments.enrollment_for_course(&actor, course).await?;
            if recalculate {
                enrollments.recalculate_progress(&actor, enrollment.id).await?;
            }
            print_json(&enrollments.enrollment(&actor, enrollment.id).await?)?;
        }
        Commands::Enrollments { course, of_user } => {
            let list = if actor.is_elevated() {
                let filter = EnrollmentFilter {
                    course_id: course,
                    user_id: of_user.map(UserId::new),
                };
                enrollments.list_enrollments(&actor, &filter).await?
            } else {
                enrollments
                    .my_enrollments(&actor)
                    .await?
                    .into_iter()
                    .filter(|e| course.map_or(true, |c| e.course_id == c))
                    .collect()
            };
            print_json(&list)?;
        }
        Commands::Unenroll { enrollment } => {
            enrollments.delete_enrollment(&actor, enrollment).await?;
            println!("Deleted enrollment {}", enrollment);
        }
    }

    Ok(())
}

async fn run_course(catalog: &impl CatalogManager, command: CourseCommand) -> Result<()> {
    match command {
        CourseCommand::Add { title, description, price, thumbnail } => {
            let course = catalog
                .create_course(CourseSpec {
                    title,
                    description,
                    price,
                    thumbnail_path: thumbnail,
                })
                .await?;
            print_json(&course)?;
        }
        CourseCommand::List => {
            let courses = catalog.list_courses().await?;
            println!("Courses ({})", courses.len());
            for course in courses {
                println!("  {} | {:>8.2} | {}", course.id, course.price, course.title);
            }
        }
        CourseCommand::Show { id } => {
            print_json(&catalog.course_outline(id).await?)?;
        }
        CourseCommand::Update { id, title, description, price, thumbnail } => {
            let patch = CoursePatch {
                title,
                description,
                price,
                thumbnail_path: thumbnail,
            };
            print_json(&catalog.update_course(id, patch).await?)?;
        }
        CourseCommand::Delete { id } => {
            catalog.delete_course(id).await?;
            println!("Deleted course {}", id);
        }
    }
    Ok(())
}

async fn run_module(catalog: &impl CatalogManager, command: ModuleCommand) -> Result<()> {
    match command {
        ModuleCommand::Add { course, title } => {
            print_json(&catalog.create_module(course, title).await?)?;
        }
        ModuleCommand::Update { id, title, number } => {
            print_json(&catalog.update_module(id, ModulePatch { title, number }).await?)?;
        }
        ModuleCommand::Renumber { course, assignments } => {
            print_json(&catalog.reorder_modules(course, assignments).await?)?;
        }
        ModuleCommand::Delete { id } => {
            catalog.delete_module(id).await?;
            println!("Deleted module {}", id);
        }
    }
    Ok(())
}

async fn run_lecture(catalog: &impl CatalogManager, actor: &Actor, command: LectureCommand) -> Result<()> {
    match command {
        LectureCommand::Add { module, title, video_url } => {
            print_json(&catalog.create_lecture(module, title, video_url).await?)?;
        }
        LectureCommand::Show { id } => {
            print_json(&catalog.lecture_for(actor, id).await?)?;
        }
        LectureCommand::Update { id, title, order, video_url } => {
            let patch = LecturePatch { title, order, video_url };
            print_json(&catalog.update_lecture(id, patch).await?)?;
        }
        LectureCommand::Delete { id } => {
            catalog.delete_lecture(id).await?;
            println!("Deleted lecture {}", id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        let id = ModuleId::new();
        assert_eq!(parse_assignment(&format!("{}=3", id)).unwrap(), (id, 3));
        assert!(parse_assignment("3").is_err());
        assert!(parse_assignment(&format!("{}=x", id)).is_err());
        assert!(parse_assignment("nope=1").is_err());
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "lectern", "enroll", "01ARZ3NDEKTSV4RRFFQ69G5FAV", "--user", "alice", "--traversal", "sorted",
        ])
        .unwrap();
        assert_eq!(cli.user, "alice");
        assert_eq!(cli.traversal, Traversal::Sorted);
        assert!(!cli.admin);
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_cli_parses_sqlite_flag() {
        let cli = Cli::try_parse_from(["lectern", "course", "list", "--sqlite"]).unwrap();
        assert!(cli.sqlite);
    }

    #[cfg(feature = "sqlite")]
    #[tokio::test]
    async fn test_commands_run_against_sqlite() {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let cli = Cli::try_parse_from(["lectern", "--admin", "course", "add", "Rust"]).unwrap();
        run(cli, storage.clone()).await.unwrap();

        let catalog = BasicCatalogManager::new(storage);
        let courses = catalog.list_courses().await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].title, "Rust");
    }
}
