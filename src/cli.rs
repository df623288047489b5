//! Command-line surface. Every command checks the stored session against
//! the page it stands in for before any request is made.

use std::path::{Path, PathBuf};

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};

use school_desk::api::ApiClient;
use school_desk::attendance::{self, AttendanceBook};
use school_desk::config::AppConfig;
use school_desk::error::{DeskError, Result};
use school_desk::ledger::{self, format_amount, format_inr, FeeSummary, PaymentRequest};
use school_desk::marks::{self, MarksSheet, ASSESSMENT_TYPES};
use school_desk::models::{AttendanceRecord, PaymentMode, Role, Student};
use school_desk::receipt::{self, ReceiptLayout};
use school_desk::roster::{
    self, dashboard_summary, filter_students, RosterKind, RosterView, StudentForm, TeacherDetails,
    TeacherForm,
};
use school_desk::session::{self, require_any, Credentials, Route, Session};
use school_desk::storage::{KeyringStore, SessionStore};

#[derive(Parser)]
#[command(name = "school-desk", version)]
#[command(about = "Attendance, marks and fee desk for the school records service")]
pub struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "SCHOOL_DESK_CONFIG")]
    pub config: Option<PathBuf>,

    /// More detailed logs
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sign in and remember the session in the OS credential store
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "SCHOOL_DESK_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the signed-in role
    Whoami,
    /// Take or review attendance
    Attendance {
        #[command(subcommand)]
        action: AttendanceCmd,
    },
    /// Fee ledger
    Fees {
        #[command(subcommand)]
        action: FeesCmd,
    },
    /// Save a PDF receipt for one payment
    Receipt {
        #[arg(long)]
        payment: String,
        /// Required for staff; students always get their own record
        #[arg(long)]
        student: Option<String>,
        /// Open the saved file afterwards
        #[arg(long)]
        open: bool,
    },
    /// Marks entry
    Marks {
        #[command(subcommand)]
        action: MarksCmd,
    },
    /// Student records
    Students {
        #[command(subcommand)]
        action: StudentsCmd,
    },
    /// Teacher records
    Teachers {
        #[command(subcommand)]
        action: TeachersCmd,
    },
    /// Role-specific overview
    Dashboard {
        /// Student view: list attendance on dates starting with this
        /// prefix, e.g. 2024-01
        #[arg(long)]
        period: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum KindArg {
    Students,
    Teachers,
}

impl From<KindArg> for RosterKind {
    fn from(k: KindArg) -> Self {
        match k {
            KindArg::Students => RosterKind::Students,
            KindArg::Teachers => RosterKind::Teachers,
        }
    }
}

#[derive(Args)]
pub struct RosterArgs {
    #[arg(long, value_enum, default_value = "students")]
    kind: KindArg,
    /// YYYY-MM-DD, today when omitted
    #[arg(long)]
    date: Option<String>,
    #[arg(long)]
    class: Option<String>,
}

#[derive(Subcommand)]
pub enum AttendanceCmd {
    Show(RosterArgs),
    Mark {
        #[command(flatten)]
        roster: RosterArgs,
        #[arg(long, value_delimiter = ',')]
        present: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        absent: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        toggle: Vec<String>,
        /// Submit even if attendance for the date already exists
        #[arg(long)]
        force: bool,
        /// Resend failed writes this many more times
        #[arg(long, default_value_t = 1)]
        retries: usize,
    },
}

#[derive(Subcommand)]
pub enum FeesCmd {
    Show {
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    Pay {
        #[arg(long)]
        student: String,
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "Cash")]
        mode: PaymentMode,
    },
    Terms {
        #[arg(long)]
        student: String,
        #[arg(long)]
        total: f64,
        #[arg(long)]
        due_date: String,
    },
}

#[derive(Clone, Debug)]
pub struct ScoreArg {
    subject: String,
    code: String,
    value: String,
}

fn parse_score(raw: &str) -> std::result::Result<ScoreArg, String> {
    let (cell, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected SUBJECT:CODE=VALUE, got {raw}"))?;
    let (subject, code) = cell
        .split_once(':')
        .ok_or_else(|| format!("expected SUBJECT:CODE=VALUE, got {raw}"))?;
    Ok(ScoreArg {
        subject: subject.trim().to_string(),
        code: code.trim().to_string(),
        value: value.trim().to_string(),
    })
}

#[derive(Subcommand)]
pub enum MarksCmd {
    Show {
        #[arg(long)]
        student: String,
    },
    Set {
        #[arg(long)]
        student: String,
        /// SUBJECT:CODE=VALUE, e.g. Maths:FA1=18; an empty value clears
        #[arg(long = "score", value_parser = parse_score, required = true)]
        scores: Vec<ScoreArg>,
    },
}

#[derive(Subcommand)]
pub enum StudentsCmd {
    List {
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Create from a JSON form `{email, password, details}`
    Add {
        #[arg(long)]
        file: PathBuf,
    },
    /// Update from a JSON form; an empty password keeps the current one
    Edit {
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
}

#[derive(Subcommand)]
pub enum TeachersCmd {
    List,
    /// Assign or unassign classes; each listed class is flipped
    Classes {
        #[arg(long)]
        id: String,
        #[arg(long, value_delimiter = ',', required = true)]
        toggle: Vec<String>,
    },
    /// Create from a JSON form `{password, details}`
    Add {
        #[arg(long)]
        file: PathBuf,
    },
    Edit {
        #[arg(long)]
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
    Delete {
        #[arg(long)]
        id: String,
    },
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

impl Command {
    /// Generic notice shown when the command fails outside validation.
    fn failure_notice(&self) -> &'static str {
        match self {
            Command::Login { .. } => "Login failed",
            Command::Logout => "Logout failed",
            Command::Whoami => "Not signed in",
            Command::Attendance { action: AttendanceCmd::Show(_) } => "Failed to load attendance",
            Command::Attendance { .. } => "Failed to submit attendance",
            Command::Fees { action: FeesCmd::Show { .. } } => "Failed to load fees",
            Command::Fees { action: FeesCmd::Pay { .. } } => "Failed to add payment",
            Command::Fees { .. } => "Failed to update fee details",
            Command::Receipt { .. } => "Failed to generate receipt",
            Command::Marks { action: MarksCmd::Show { .. } } => "Failed to load marks",
            Command::Marks { .. } => "Failed to save marks",
            Command::Students { .. } => "Student request failed",
            Command::Teachers { .. } => "Teacher request failed",
            Command::Dashboard { .. } => "Failed to load dashboard",
        }
    }

    /// Commands whose server message is worth echoing verbatim.
    fn echoes_server_message(&self) -> bool {
        matches!(
            self,
            Command::Login { .. }
                | Command::Students { action: StudentsCmd::Add { .. } | StudentsCmd::Edit { .. } }
                | Command::Teachers {
                    action: TeachersCmd::Add { .. }
                        | TeachersCmd::Edit { .. }
                        | TeachersCmd::Classes { .. }
                }
        )
    }
}

struct Context {
    cfg: AppConfig,
    store: KeyringStore,
    /// Client without a session; gated commands attach theirs.
    api: ApiClient,
}

impl Context {
    fn session(&self) -> Result<Session> {
        self.store.load().ok_or(DeskError::Unauthenticated)
    }

    /// Check the session against the pages the command stands in for and
    /// return a client carrying it.
    fn gated(&self, routes: &[Route]) -> Result<(Session, ApiClient)> {
        let session = self.store.load();
        require_any(session.as_ref(), routes)?;
        let session = session.ok_or(DeskError::Unauthenticated)?;
        let api = self.api.clone().with_session(Some(session.clone()));
        Ok((session, api))
    }
}

/// Drop a stored session the server no longer accepts. Returns true when
/// the operator has to sign in again.
fn forget_rejected_session(store: &dyn SessionStore, e: &DeskError) -> bool {
    if !e.is_auth_failure() {
        return false;
    }
    if matches!(e, DeskError::Server { .. }) {
        match store.clear() {
            Ok(()) => warn!("stored session rejected by the server, cleared"),
            Err(clear_err) => warn!(error = %clear_err, "could not clear rejected session"),
        }
    }
    true
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let cfg = AppConfig::load(cli.config.as_deref())?;
    let ctx = Context {
        store: KeyringStore::new(cfg.keyring_service.clone()),
        api: ApiClient::from_config(&cfg, None)?,
        cfg,
    };
    let generic = cli.command.failure_notice();
    let detailed = cli.command.echoes_server_message();
    let signing_in = matches!(cli.command, Command::Login { .. });

    if let Err(e) = dispatch(&ctx, cli.command).await {
        error!(error = %e, "command failed");
        let notice = if detailed {
            e.notice_with_detail(generic)
        } else {
            e.notice(generic)
        };
        if !signing_in && forget_rejected_session(&ctx.store, &e) {
            eprintln!("Sign in with `school-desk login`.");
        }
        anyhow::bail!(notice);
    }
    Ok(())
}

async fn dispatch(ctx: &Context, command: Command) -> Result<()> {
    match command {
        Command::Login { email, password } => {
            let session =
                session::login(&ctx.api, &ctx.store, &Credentials::new(email, password)).await?;
            println!(
                "Signed in as {} (home: {})",
                session.role(),
                session.home_route().path()
            );
            Ok(())
        }
        Command::Logout => {
            match ctx.store.load() {
                Some(s) => session::logout(&ctx.store, s)?,
                None => ctx.store.clear()?,
            }
            println!("Signed out");
            Ok(())
        }
        Command::Whoami => {
            let s = ctx.session()?;
            println!("{} (home: {})", s.role(), s.home_route().path());
            Ok(())
        }
        Command::Attendance { action } => run_attendance(ctx, action).await,
        Command::Fees { action } => run_fees(ctx, action).await,
        Command::Receipt {
            payment,
            student,
            open,
        } => run_receipt(ctx, &payment, student.as_deref(), open).await,
        Command::Marks { action } => run_marks(ctx, action).await,
        Command::Students { action } => run_students(ctx, action).await,
        Command::Teachers { action } => run_teachers(ctx, action).await,
        Command::Dashboard { period } => run_dashboard(ctx, period.as_deref()).await,
    }
}

// ---------------------------------------------------------------------------
// Attendance
// ---------------------------------------------------------------------------

const ATTENDANCE_ROUTES: &[Route] = &[Route::AdminAttendance, Route::TeacherAttendance];

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn print_sheet(book: &AttendanceBook, roster: &[roster::RosterEntry]) {
    println!(
        "{} on {}{}",
        book.kind().label(),
        book.selected_date(),
        book.class_filter()
            .map(|c| format!(" (class {c})"))
            .unwrap_or_default()
    );
    for entry in book.visible(roster) {
        let mark = if book.status(entry) { "[x]" } else { "[ ]" };
        println!(
            "{mark} {:<26} {:<28} {:<10} {}",
            entry.id,
            entry.name,
            entry.class_label,
            book.status_label(entry).as_str()
        );
    }
}

fn roster_entry<'a>(
    entries: &'a [roster::RosterEntry],
    kind: RosterKind,
    id: &str,
) -> Result<&'a roster::RosterEntry> {
    let id = id.trim();
    entries
        .iter()
        .find(|e| e.id == id)
        .ok_or_else(|| DeskError::validation(format!("No {} with id {id}", kind.label())))
}

async fn run_attendance(ctx: &Context, action: AttendanceCmd) -> Result<()> {
    let (session, api) = ctx.gated(ATTENDANCE_ROUTES)?;
    let (args, present, absent, toggle, force, retries) = match action {
        AttendanceCmd::Show(args) => (args, None, Vec::new(), Vec::new(), false, 0),
        AttendanceCmd::Mark {
            roster,
            present,
            absent,
            toggle,
            force,
            retries,
        } => (roster, Some(present), absent, toggle, force, retries),
    };

    let view = RosterView::new(session.role(), args.kind.into())?;
    let mut book = AttendanceBook::new(view.kind(), &args.date.unwrap_or_else(today))?;
    book.set_class_filter(args.class.as_deref());
    let entries = roster::load_entries(&api, &view).await?;

    let Some(present) = present else {
        print_sheet(&book, &entries);
        return Ok(());
    };

    if book.already_submitted(&entries) && !force {
        return Err(DeskError::validation(format!(
            "Attendance for {} has already been submitted. Re-run with --force to submit again.",
            book.selected_date()
        )));
    }
    for id in &present {
        let entry = roster_entry(&entries, view.kind(), id)?;
        book.mark(&entry.id, true);
    }
    for id in &absent {
        let entry = roster_entry(&entries, view.kind(), id)?;
        book.mark(&entry.id, false);
    }
    for id in &toggle {
        book.toggle(roster_entry(&entries, view.kind(), id)?);
    }

    let report = attendance::submit_with_retry(&api, &view, &mut book, retries).await?;
    if let Some(failure) = report.failure() {
        for r in report.failed() {
            eprintln!("  not saved: {}", r.id);
        }
        return Err(failure);
    }
    println!("Attendance submitted successfully!");
    if let Some(refreshed) = &report.refreshed {
        print_sheet(&book, refreshed);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Fees and receipts
// ---------------------------------------------------------------------------

const FEES_ROUTES: &[Route] = &[Route::AdminFeesEntry, Route::TeacherFeesEntry];

async fn find_student(api: &ApiClient, view: &RosterView, id: &str) -> Result<Student> {
    api.list_students(view.list_path())
        .await?
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| DeskError::validation(format!("No student with id {id}")))
}

fn print_fees(student: &Student) {
    let summary = FeeSummary::for_student(student);
    println!(
        "{:<26} {:<24} total {:>10}  paid {:>10}  due {:>10}  by {}",
        student.id,
        student.name,
        format_amount(summary.total_fee),
        format_amount(summary.total_paid),
        format_amount(summary.due),
        summary.due_date.as_deref().unwrap_or("-"),
    );
}

async fn run_fees(ctx: &Context, action: FeesCmd) -> Result<()> {
    let (session, api) = ctx.gated(FEES_ROUTES)?;
    let view = RosterView::new(session.role(), RosterKind::Students)?;
    match action {
        FeesCmd::Show { class, name } => {
            let students = api.list_students(view.list_path()).await?;
            for s in filter_students(&students, class.as_deref(), name.as_deref()) {
                print_fees(s);
                for p in FeeSummary::for_student(s).payments {
                    println!(
                        "    {:<26} {:<10} {:>10} {:<10} {}",
                        p.id,
                        p.date,
                        format_amount(p.amount),
                        p.mode,
                        p.status
                    );
                }
            }
        }
        FeesCmd::Pay {
            student,
            amount,
            mode,
        } => {
            let current = find_student(&api, &view, &student).await?;
            let request = PaymentRequest {
                amount,
                mode,
                date: None,
            };
            let refreshed = ledger::record_payment(&api, &view, &current, &request).await?;
            println!("Payment added successfully");
            print_fees(&refreshed);
        }
        FeesCmd::Terms {
            student,
            total,
            due_date,
        } => {
            let mut current = find_student(&api, &view, &student).await?;
            ledger::save_fee_terms(&api, &mut current, total, &due_date).await?;
            println!("Fee details updated");
            print_fees(&current);
        }
    }
    Ok(())
}

async fn run_receipt(
    ctx: &Context,
    payment_id: &str,
    student_id: Option<&str>,
    open: bool,
) -> Result<()> {
    let (session, api) = ctx.gated(&[
        Route::StudentDashboard,
        Route::AdminFeesEntry,
        Route::TeacherFeesEntry,
    ])?;
    let student = match session.role() {
        Role::Student => api.fetch_student_self().await?,
        role => {
            let id = student_id
                .ok_or_else(|| DeskError::validation("--student is required for staff"))?;
            let view = RosterView::new(role, RosterKind::Students)?;
            find_student(&api, &view, id).await?
        }
    };
    let payment = student
        .payments
        .iter()
        .find(|p| p.id == payment_id)
        .ok_or_else(|| DeskError::validation(format!("No payment with id {payment_id}")))?;

    let source = ctx.cfg.logo_source()?;
    let layout = ReceiptLayout::from_config(&ctx.cfg);
    let rendered = receipt::generate_receipt(&api, &source, &layout, &student, payment).await?;
    let path = receipt::save_receipt(&ctx.cfg.download_dir, &rendered)?;
    println!("Receipt saved to {}", path.display());
    if open {
        open_file(&path);
    }
    Ok(())
}

fn open_file(path: &Path) {
    let target = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    if let Err(e) = webbrowser::open(&target.to_string_lossy()) {
        error!(path = %target.display(), error = %e, "failed to open receipt");
        eprintln!("Could not open {}", target.display());
    }
}

// ---------------------------------------------------------------------------
// Marks
// ---------------------------------------------------------------------------

const MARKS_ROUTES: &[Route] = &[Route::AdminMarksEntry, Route::TeacherMarksEntry];

fn print_marks(sheet: &MarksSheet) {
    print!("{:<10}", "Subject");
    for code in ASSESSMENT_TYPES {
        print!(" {code:>4}");
    }
    println!();
    for entry in sheet.marks() {
        print!("{:<10}", entry.subject);
        for code in ASSESSMENT_TYPES {
            let cell = entry
                .assessments
                .get(code)
                .copied()
                .flatten()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string());
            print!(" {cell:>4}");
        }
        println!();
    }
    let totals = sheet.totals();
    print!("{:<10}", "Total");
    for code in ASSESSMENT_TYPES {
        print!(" {:>4}", totals.get(code).copied().unwrap_or(0));
    }
    println!();
}

async fn run_marks(ctx: &Context, action: MarksCmd) -> Result<()> {
    let (session, api) = ctx.gated(MARKS_ROUTES)?;
    let view = RosterView::new(session.role(), RosterKind::Students)?;
    match action {
        MarksCmd::Show { student } => {
            let s = find_student(&api, &view, &student).await?;
            println!("{} ({})", s.name, s.class.as_deref().unwrap_or("N/A"));
            print_marks(&MarksSheet::for_student(&s));
        }
        MarksCmd::Set { student, scores } => {
            let mut s = find_student(&api, &view, &student).await?;
            let mut sheet = MarksSheet::for_student(&s);
            for score in &scores {
                sheet.set_score(&score.subject, &score.code, &score.value)?;
            }
            marks::save_marks(&api, &mut s, &sheet).await?;
            println!("Marks saved successfully!");
            print_marks(&sheet);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn read_form<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| DeskError::validation(format!("Invalid form {}: {e}", path.display())))
}

async fn run_students(ctx: &Context, action: StudentsCmd) -> Result<()> {
    match action {
        StudentsCmd::List { class, name } => {
            let (session, api) =
                ctx.gated(&[Route::StudentsManagement, Route::TeacherStudents])?;
            let path = roster::student_list_path(session.role())?;
            let students = api.list_students(path).await?;
            for s in filter_students(&students, class.as_deref(), name.as_deref()) {
                println!(
                    "{:<26} {:<28} {:<6} {}",
                    s.id,
                    s.name,
                    s.class.as_deref().unwrap_or("N/A"),
                    s.admission_number.as_deref().unwrap_or("N/A")
                );
            }
            println!("{} student(s)", students.len());
        }
        StudentsCmd::Add { file } => {
            let (_, api) = ctx.gated(&[Route::StudentsManagement])?;
            let form: StudentForm = read_form(&file)?;
            api.create_student(&form).await?;
            info!(email = %form.email.trim(), "student created");
            println!("Student created successfully");
        }
        StudentsCmd::Edit { id, file } => {
            let (_, api) = ctx.gated(&[Route::StudentsManagement])?;
            let form: StudentForm = read_form(&file)?;
            api.update_student(&id, &form).await?;
            println!("Student updated successfully");
        }
        StudentsCmd::Delete { id } => {
            let (_, api) = ctx.gated(&[Route::StudentsManagement])?;
            api.delete_student(&id).await?;
            info!(student_id = %id, "student deleted");
            println!("Student deleted");
        }
    }
    Ok(())
}

async fn run_teachers(ctx: &Context, action: TeachersCmd) -> Result<()> {
    let (_, api) = ctx.gated(&[Route::TeachersManagement])?;
    match action {
        TeachersCmd::List => {
            let teachers = api.list_teachers().await?;
            for t in &teachers {
                let classes = if t.classes.is_empty() {
                    "N/A".to_string()
                } else {
                    t.classes.join(", ")
                };
                println!(
                    "{:<26} {:<24} {:<10} {:<12} {}",
                    t.id,
                    t.name,
                    t.subject.as_deref().unwrap_or("-"),
                    t.phone.as_deref().unwrap_or("-"),
                    classes
                );
            }
            println!("{} teacher(s)", teachers.len());
        }
        TeachersCmd::Classes { id, toggle } => {
            let teacher = api
                .list_teachers()
                .await?
                .into_iter()
                .find(|t| t.id == id)
                .ok_or_else(|| DeskError::validation(format!("No teacher with id {id}")))?;
            let mut details = TeacherDetails::from_teacher(&teacher);
            for class in &toggle {
                details.toggle_class(class.trim());
            }
            let classes = details.classes.join(", ");
            let form = TeacherForm {
                password: String::new(),
                details,
            };
            api.update_teacher(&id, &form).await?;
            info!(teacher_id = %id, %classes, "teacher classes updated");
            println!("Classes for {}: {classes}", teacher.name);
        }
        TeachersCmd::Add { file } => {
            let form: TeacherForm = read_form(&file)?;
            api.create_teacher(&form).await?;
            println!("Teacher registered successfully");
        }
        TeachersCmd::Edit { id, file } => {
            let form: TeacherForm = read_form(&file)?;
            api.update_teacher(&id, &form).await?;
            println!("Teacher updated successfully");
        }
        TeachersCmd::Delete { id } => {
            api.delete_teacher(&id).await?;
            info!(teacher_id = %id, "teacher deleted");
            println!("Teacher deleted");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Dashboard
// ---------------------------------------------------------------------------

async fn run_dashboard(ctx: &Context, period: Option<&str>) -> Result<()> {
    let (session, api) = ctx.gated(&[
        Route::AdminDashboard,
        Route::TeacherDashboard,
        Route::StudentDashboard,
    ])?;
    match session.role() {
        Role::Admin => {
            let students = api
                .list_students(roster::student_list_path(Role::Admin)?)
                .await?;
            let teachers = api.list_teachers().await?;
            let summary = dashboard_summary(&students, &teachers);
            println!("Students: {}", summary.students);
            println!("Teachers: {}", summary.teachers);
            println!("Earnings: {}", format_inr(summary.earnings));
            for (class, count) in &summary.students_per_class {
                println!("  class {class:<6} {count} student(s)");
            }
        }
        Role::Teacher => {
            let me = api.fetch_teacher_self().await?;
            let history = api.fetch_teacher_attendance().await?;
            println!("{} ({})", me.name, me.subject.as_deref().unwrap_or("-"));
            println!("Classes: {}", me.classes.join(", "));
            println!(
                "Attendance: {}% over {} day(s)",
                attendance::attendance_percentage(&history),
                history.len()
            );
        }
        Role::Student => {
            let me = api.fetch_student_self().await?;
            println!("{} ({})", me.name, me.class.as_deref().unwrap_or("N/A"));
            println!(
                "Attendance: {}%",
                attendance::attendance_percentage(&me.attendance)
            );
            let fees = FeeSummary::for_student(&me);
            println!(
                "Total fee {}  paid {}  due {}",
                format_inr(fees.total_fee),
                format_inr(fees.total_paid),
                format_inr(fees.due)
            );
            for p in &fees.payments {
                println!("  {:<26} {:<10} {:>8} {}", p.id, p.date, format_amount(p.amount), p.mode);
            }
            print_marks(&MarksSheet::for_student(&me));
            if let Some(prefix) = period {
                let days: Vec<AttendanceRecord> = attendance::student_history(&me, Some(prefix))
                    .into_iter()
                    .cloned()
                    .collect();
                println!(
                    "Attendance for {prefix}: {}% over {} day(s)",
                    attendance::attendance_percentage(&days),
                    days.len()
                );
                for day in &days {
                    let mark = if day.present { "Present" } else { "Absent" };
                    println!("  {} {mark}", day.day());
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn score_argument_parses() {
        let s = parse_score("Maths:FA1=18").expect("score");
        assert_eq!((s.subject.as_str(), s.code.as_str(), s.value.as_str()), ("Maths", "FA1", "18"));
        let cleared = parse_score("Hindi:SA2=").expect("score");
        assert!(cleared.value.is_empty());
        assert!(parse_score("Maths=18").is_err());
    }

    #[test]
    fn attendance_mark_flags() {
        let cli = Cli::try_parse_from([
            "school-desk",
            "attendance",
            "mark",
            "--kind",
            "teachers",
            "--date",
            "2024-01-01",
            "--present",
            "t1,t2",
            "--force",
        ])
        .expect("parse");
        match cli.command {
            Command::Attendance {
                action: AttendanceCmd::Mark { roster, present, force, retries, .. },
            } => {
                assert!(matches!(roster.kind, KindArg::Teachers));
                assert_eq!(present, vec!["t1", "t2"]);
                assert!(force);
                assert_eq!(retries, 1);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn unknown_roster_ids_are_validation_errors() {
        let student = Student {
            id: "s1".into(),
            name: "Asha".into(),
            ..Student::default()
        };
        let entries = vec![roster::RosterEntry::from(&student)];
        let found = roster_entry(&entries, RosterKind::Students, " s1 ").expect("found");
        assert_eq!(found.id, "s1");
        let err = roster_entry(&entries, RosterKind::Students, "s9").unwrap_err();
        assert!(matches!(err, DeskError::Validation(_)));
    }

    #[test]
    fn rejected_session_is_forgotten() {
        let store = school_desk::MemoryStore::new();
        store
            .save(&Session::new("tok", Role::Teacher))
            .expect("save");

        let invalid = DeskError::validation("Enter a valid email");
        assert!(!forget_rejected_session(&store, &invalid));
        assert!(store.load().is_some());

        let expired = DeskError::Server {
            status: 401,
            message: "Token expired".into(),
        };
        assert!(forget_rejected_session(&store, &expired));
        assert!(store.load().is_none());
    }

    #[test]
    fn dashboard_period_and_class_toggles_parse() {
        let cli = Cli::try_parse_from(["school-desk", "dashboard", "--period", "2024-01"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Command::Dashboard { period: Some(ref p) } if p == "2024-01"
        ));

        let cli = Cli::try_parse_from([
            "school-desk", "teachers", "classes", "--id", "t1", "--toggle", "5,6",
        ])
        .expect("parse");
        assert!(cli.command.echoes_server_message());
        match cli.command {
            Command::Teachers {
                action: TeachersCmd::Classes { id, toggle },
            } => {
                assert_eq!(id, "t1");
                assert_eq!(toggle, vec!["5", "6"]);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn notices_per_command() {
        let cli = Cli::try_parse_from([
            "school-desk", "fees", "pay", "--student", "s1", "--amount", "500", "--mode", "upi",
        ])
        .expect("parse");
        assert_eq!(cli.command.failure_notice(), "Failed to add payment");
        assert!(!cli.command.echoes_server_message());
    }
}
