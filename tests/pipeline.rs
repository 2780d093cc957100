use pipeshell::command::{EXIT_LAUNCH_FAILURE, PIPELINE_FAILURE};
use pipeshell::{Environment, Interpreter};
use std::collections::HashMap;
use std::env as stdenv;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn lock_current_dir() -> MutexGuard<'static, ()> {
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|e| e.into_inner())
}

struct TestDir(PathBuf);

impl TestDir {
    fn new(tag: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = stdenv::temp_dir().join(format!("pipeshell_it_{}_{}_{}", tag, std::process::id(), nanos));
        fs::create_dir_all(&dir).expect("create temp dir");
        TestDir(fs::canonicalize(dir).expect("canonicalize temp dir"))
    }

    fn path(&self, name: &str) -> String {
        self.0.join(name).to_string_lossy().into_owned()
    }

    fn read(&self, name: &str) -> String {
        fs::read_to_string(self.0.join(name)).expect("read output file")
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn redirected_output_reads_back_through_input_redirection() {
    let dir = TestDir::new("roundtrip");
    let out = dir.path("out.txt");
    let copy = dir.path("copy.txt");
    let mut sh = Interpreter::new();

    assert_eq!(sh.execute_line(&format!("echo hi > {}", out)), Some(0));
    assert_eq!(sh.execute_line(&format!("cat < {} > {}", out, copy)), Some(0));

    assert_eq!(dir.read("out.txt"), "hi\n");
    assert_eq!(dir.read("copy.txt"), "hi\n");
}

#[test]
fn append_twice_then_truncate() {
    let dir = TestDir::new("append");
    let f = dir.path("f");
    let mut sh = Interpreter::new();

    sh.execute_line(&format!(r#"echo "x" >> {}"#, f));
    sh.execute_line(&format!(r#"echo "x" >> {}"#, f));
    assert_eq!(dir.read("f"), "x\nx\n");

    sh.execute_line(&format!(r#"echo "x" > {}"#, f));
    assert_eq!(dir.read("f"), "x\n");
}

#[test]
fn two_stage_pipeline_counts_lines() {
    let dir = TestDir::new("count");
    fs::write(dir.0.join("input.txt"), "one\ntwo\nthree\n").unwrap();
    let mut sh = Interpreter::new();

    let line = format!("cat {} | wc -l > {}", dir.path("input.txt"), dir.path("n"));
    assert_eq!(sh.execute_line(&line), Some(0));
    assert_eq!(dir.read("n").trim(), "3");
}

#[test]
fn builtin_inside_pipeline_runs_as_program() {
    let dir = TestDir::new("echo_pipe");
    let mut sh = Interpreter::new();

    let line = format!("echo 'a b' | tr ' ' '_' > {}", dir.path("out"));
    assert_eq!(sh.execute_line(&line), Some(0));
    assert_eq!(dir.read("out"), "a_b\n");
}

#[test]
fn echo_expands_variables_from_interpreter_state() {
    let dir = TestDir::new("vars");
    let mut env = Environment::new();
    env.set_var("PIPESHELL_GREETING", "hello");
    let mut sh = Interpreter::with_env(env);

    let line = format!("echo $PIPESHELL_GREETING x$PIPESHELL_GREETING > {}", dir.path("out"));
    assert_eq!(sh.execute_line(&line), Some(0));
    assert_eq!(dir.read("out"), "hello x$PIPESHELL_GREETING\n");
}

#[test]
fn missing_first_program_does_not_hang_pipeline() {
    let dir = TestDir::new("missing");
    let mut sh = Interpreter::new();

    let started = Instant::now();
    let line = format!("pipeshell-no-such-program-4711 arg | cat > {}", dir.path("out"));
    assert_eq!(sh.execute_line(&line), Some(0));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(dir.read("out"), "");

    assert_eq!(
        sh.execute_line("pipeshell-no-such-program-4711"),
        Some(EXIT_LAUNCH_FAILURE)
    );
    assert_eq!(sh.env().last_status, Some(EXIT_LAUNCH_FAILURE));
}

#[test]
fn terminal_stage_decides_status() {
    let mut sh = Interpreter::new();
    assert_eq!(sh.execute_line("true | false"), Some(1));
    assert_eq!(sh.execute_line("false | true"), Some(0));
    assert_eq!(sh.execute_line("sh -c 'kill -9 $$'"), Some(PIPELINE_FAILURE));
}

#[test]
fn whitespace_line_spawns_nothing() {
    let mut sh = Interpreter::new();
    assert_eq!(sh.execute_line("    \t"), None);
    assert_eq!(sh.env().last_status, None);
    assert!(!sh.should_exit());
}

#[test]
fn cd_without_home_keeps_directory() {
    let _lock = lock_current_dir();
    let before = stdenv::current_dir().unwrap();
    let env = Environment {
        vars: HashMap::new(),
        current_dir: before.clone(),
        should_exit: false,
        last_status: None,
    };
    let mut sh = Interpreter::with_env(env);

    assert_eq!(sh.execute_line("cd"), Some(1));
    assert_eq!(stdenv::current_dir().unwrap(), before);
    assert_eq!(sh.env().current_dir, before);
}

#[test]
fn cd_to_missing_directory_keeps_directory() {
    let _lock = lock_current_dir();
    let before = stdenv::current_dir().unwrap();
    let mut sh = Interpreter::new();

    assert_eq!(sh.execute_line("cd /nonexistent/pipeshell"), Some(1));
    assert_eq!(stdenv::current_dir().unwrap(), before);
}

#[test]
fn cd_changes_directory_for_later_programs() {
    let _lock = lock_current_dir();
    let before = stdenv::current_dir().unwrap();
    let dir = TestDir::new("cd");
    let mut sh = Interpreter::new();

    assert_eq!(sh.execute_line(&format!("cd '{}'", dir.0.display())), Some(0));
    assert_eq!(sh.env().current_dir, dir.0);
    assert_eq!(sh.execute_line("pwd > here.txt"), Some(0));
    assert_eq!(sh.execute_line("sh -c pwd > there.txt"), Some(0));

    stdenv::set_current_dir(&before).expect("restore cwd");

    let expected = format!("{}\n", dir.0.display());
    assert_eq!(dir.read("here.txt"), expected);
    assert_eq!(dir.read("there.txt"), expected);
}

#[test]
fn bare_exit_ends_session_but_exit_in_pipeline_does_not() {
    let mut sh = Interpreter::new();
    sh.execute_line("exit | cat");
    assert!(!sh.should_exit());

    sh.execute_line("exit");
    assert!(sh.should_exit());
}
