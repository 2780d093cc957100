//! Process orchestration: runs every stage of a pipeline as its own process.
//!
//! The parent creates all pipes up front, forks one child per non-empty stage
//! and then closes its own copies of the pipe ends before waiting. Each child
//! goes through the same fixed sequence before it becomes the target program:
//! wire pipes, close every pipe descriptor, apply file redirections, exec.
//! Any failure on that path ends the child with [`EXIT_LAUNCH_FAILURE`].

use crate::command::{EXIT_LAUNCH_FAILURE, ExitCode, PIPELINE_FAILURE};
use crate::parser::Pipeline;
use crate::redirect::{OUTPUT_FILE_MODE, extract_redirections};
use log::debug;
use nix::errno::Errno;
use nix::fcntl::{self, FcntlArg, FdFlag, OFlag};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{WaitStatus, waitpid};
use nix::unistd::{self, ForkResult, Pid};
use std::convert::Infallible;
use std::ffi::{CStr, CString, NulError};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::{error, fmt};

#[derive(Debug)]
pub enum ExecError {
    Pipe(Errno),
    Fork(Errno),
    Dup(Errno),
    Signal(Errno),
    Open { path: String, source: Errno },
    Exec { program: String, source: Errno },
    Nul(NulError),
}

impl From<NulError> for ExecError {
    fn from(e: NulError) -> ExecError {
        ExecError::Nul(e)
    }
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Pipe(e) => write!(f, "pipe: {}", e.desc()),
            ExecError::Fork(e) => write!(f, "fork: {}", e.desc()),
            ExecError::Dup(e) => write!(f, "dup2: {}", e.desc()),
            ExecError::Signal(e) => write!(f, "signal: {}", e.desc()),
            ExecError::Open { path, source } => write!(f, "{}: {}", path, source.desc()),
            ExecError::Exec {
                program,
                source: Errno::ENOENT,
            } => write!(f, "{}: command not found", program),
            ExecError::Exec { program, source } => write!(f, "{}: {}", program, source.desc()),
            ExecError::Nul(e) => write!(f, "argument contains a NUL byte: {}", e),
        }
    }
}

impl error::Error for ExecError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ExecError::Pipe(e)
            | ExecError::Fork(e)
            | ExecError::Dup(e)
            | ExecError::Signal(e) => Some(e),
            ExecError::Open { source, .. } | ExecError::Exec { source, .. } => Some(source),
            ExecError::Nul(e) => Some(e),
        }
    }
}

/// The `N - 1` pipes connecting the `N` stages of a pipeline.
///
/// Pipe `i` carries stage `i`'s output to stage `i + 1`. Every descriptor is
/// owned here and closed when the chain is dropped, on every exit path.
#[derive(Debug)]
pub struct PipeChain {
    pipes: Vec<(OwnedFd, OwnedFd)>,
}

impl PipeChain {
    /// Creates `count` pipes. If one fails, those already created are closed.
    pub fn open(count: usize) -> Result<Self, ExecError> {
        let mut pipes = Vec::with_capacity(count);
        for _ in 0..count {
            // O_CLOEXEC keeps the ends out of programs spawned concurrently elsewhere.
            pipes.push(unistd::pipe2(OFlag::O_CLOEXEC).map_err(ExecError::Pipe)?);
        }
        Ok(PipeChain { pipes })
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    /// Read end that becomes stage `index`'s stdin; `None` for the first stage.
    pub fn stdin_for(&self, index: usize) -> Option<RawFd> {
        let (read, _) = self.pipes.get(index.checked_sub(1)?)?;
        Some(read.as_raw_fd())
    }

    /// Write end that becomes stage `index`'s stdout; `None` for the last stage.
    pub fn stdout_for(&self, index: usize) -> Option<RawFd> {
        let (_, write) = self.pipes.get(index)?;
        Some(write.as_raw_fd())
    }

    fn raw_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.pipes
            .iter()
            .flat_map(|(read, write)| [read.as_raw_fd(), write.as_raw_fd()])
    }

    /// Closes every pipe descriptor in a forked child, which never runs destructors.
    ///
    /// Descriptors listed in `wired` already hold the child's stdin or stdout
    /// and stay open even if a pipe end was created at that number.
    fn close_in_child(&self, wired: &[Option<RawFd>]) {
        for fd in self.raw_fds().filter(|fd| !wired.contains(&Some(*fd))) {
            let _ = unistd::close(fd);
        }
    }
}

/// A stage converted to C strings before forking, so the child only has to
/// shuffle descriptors and exec.
#[derive(Debug)]
struct PreparedStage {
    index: usize,
    argv: Vec<CString>,
    input: Option<CString>,
    output: Option<(CString, bool)>,
}

impl PreparedStage {
    fn program(&self) -> &CStr {
        &self.argv[0]
    }

    fn program_name(&self) -> String {
        self.program().to_string_lossy().into_owned()
    }
}

/// Stages whose argument list is empty are left out; their position still counts for pipe wiring.
fn prepare_stages(pipeline: &Pipeline) -> Result<Vec<PreparedStage>, ExecError> {
    let mut prepared = Vec::with_capacity(pipeline.len());
    for (index, stage) in pipeline.stages().iter().enumerate() {
        let (argv, spec) = extract_redirections(stage);
        if argv.is_empty() {
            debug!("stage {} has no command, skipping it", index);
            continue;
        }
        prepared.push(PreparedStage {
            index,
            argv: argv
                .into_iter()
                .map(CString::new)
                .collect::<Result<_, _>>()?,
            input: spec.input.map(CString::new).transpose()?,
            output: match spec.output {
                Some(path) => Some((CString::new(path)?, spec.append)),
                None => None,
            },
        });
    }
    Ok(prepared)
}

/// Runs every stage of `pipeline` as a child process and waits for all of them.
///
/// Returns the exit status of the last spawned process, or [`PIPELINE_FAILURE`]
/// if that process was killed by a signal or the pipeline could not be built.
/// Failures are reported on stderr.
pub fn run_pipeline(pipeline: &Pipeline) -> ExitCode {
    let stages = match prepare_stages(pipeline) {
        Ok(stages) => stages,
        Err(e) => return report(e),
    };
    if stages.is_empty() {
        return 0;
    }

    let pipes = match PipeChain::open(pipeline.pipe_count()) {
        Ok(pipes) => pipes,
        Err(e) => return report(e),
    };
    debug!("created {} pipe(s) for {} stage(s)", pipes.len(), pipeline.len());

    let mut children = Vec::with_capacity(stages.len());
    let mut failure = None;
    for stage in &stages {
        match spawn_stage(stage, &pipes) {
            Ok(pid) => {
                debug!("stage {} ({}) is pid {}", stage.index, stage.program_name(), pid);
                children.push(pid);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // Readers see end-of-input only once the parent's write ends are gone too.
    drop(pipes);

    let status = wait_all(&children);
    match failure {
        Some(e) => report(e),
        None => status,
    }
}

fn report(e: ExecError) -> ExitCode {
    eprintln!("pipeshell: {}", e);
    PIPELINE_FAILURE
}

fn spawn_stage(stage: &PreparedStage, pipes: &PipeChain) -> Result<Pid, ExecError> {
    // SAFETY: the child only touches descriptors before it execs or `_exit`s.
    match unsafe { unistd::fork() }.map_err(ExecError::Fork)? {
        ForkResult::Parent { child } => Ok(child),
        ForkResult::Child => match exec_stage(stage, pipes) {
            Ok(never) => match never {},
            Err(e) => child_fail(&e),
        },
    }
}

/// Child side: signals reset, pipes wired, then redirections applied, then exec.
fn exec_stage(stage: &PreparedStage, pipes: &PipeChain) -> Result<Infallible, ExecError> {
    // An ignored SIGPIPE survives exec; writers into a closed pipe must die instead.
    // SAFETY: installs the default disposition, no handler code runs.
    let reset = unsafe { signal::signal(Signal::SIGPIPE, SigHandler::SigDfl) };
    reset.map_err(ExecError::Signal)?;
    wire_pipes(stage.index, pipes)?;
    apply_redirections(stage)?;
    unistd::execvp(stage.program(), &stage.argv).map_err(|source| ExecError::Exec {
        program: stage.program_name(),
        source,
    })
}

fn wire_pipes(index: usize, pipes: &PipeChain) -> Result<(), ExecError> {
    let stdin = pipes.stdin_for(index);
    let stdout = pipes.stdout_for(index);
    if let Some(fd) = stdin {
        install_fd(fd, libc::STDIN_FILENO)?;
    }
    if let Some(fd) = stdout {
        install_fd(fd, libc::STDOUT_FILENO)?;
    }
    let wired = [
        stdin.map(|_| libc::STDIN_FILENO),
        stdout.map(|_| libc::STDOUT_FILENO),
    ];
    // Including ends this stage does not use: a stray write end keeps a reader blocked forever.
    pipes.close_in_child(&wired);
    Ok(())
}

/// Makes `fd` available as `target` across exec.
///
/// With stdin or stdout closed in the parent, a new descriptor can already sit
/// at `target`; `dup2` is then a no-op and only the close-on-exec flag has to go.
fn install_fd(fd: RawFd, target: RawFd) -> Result<(), ExecError> {
    if fd == target {
        fcntl::fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))
            .map(drop)
            .map_err(ExecError::Dup)
    } else {
        unistd::dup2(fd, target).map(drop).map_err(ExecError::Dup)
    }
}

/// File redirections come after pipe wiring, so they win over the pipe for their direction.
fn apply_redirections(stage: &PreparedStage) -> Result<(), ExecError> {
    if let Some(path) = &stage.input {
        redirect_fd(path, OFlag::O_RDONLY, libc::STDIN_FILENO)?;
    }
    if let Some((path, append)) = &stage.output {
        let mode = if *append { OFlag::O_APPEND } else { OFlag::O_TRUNC };
        redirect_fd(path, OFlag::O_WRONLY | OFlag::O_CREAT | mode, libc::STDOUT_FILENO)?;
    }
    Ok(())
}

fn redirect_fd(path: &CStr, flags: OFlag, target: RawFd) -> Result<(), ExecError> {
    let mode = Mode::from_bits_truncate(OUTPUT_FILE_MODE as libc::mode_t);
    let fd = fcntl::open(path, flags | OFlag::O_CLOEXEC, mode).map_err(|source| ExecError::Open {
        path: path.to_string_lossy().into_owned(),
        source,
    })?;
    let installed = install_fd(fd, target);
    if fd != target {
        let _ = unistd::close(fd);
    }
    installed
}

fn child_fail(e: &ExecError) -> ! {
    let msg = format!("pipeshell: {}\n", e);
    // No logger and no std stream locks after fork: one raw write to fd 2.
    unsafe {
        libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::_exit(EXIT_LAUNCH_FAILURE)
    }
}

/// Waits for every child; a failed wait is reported and the others are still reaped.
fn wait_all(children: &[Pid]) -> ExitCode {
    let mut status = 0;
    for &pid in children {
        status = match wait_child(pid) {
            Ok(WaitStatus::Exited(_, code)) => {
                debug!("pid {} exited with {}", pid, code);
                code
            }
            Ok(other) => {
                debug!("pid {} ended abnormally: {:?}", pid, other);
                PIPELINE_FAILURE
            }
            Err(e) => {
                eprintln!("pipeshell: waitpid {}: {}", pid, e.desc());
                PIPELINE_FAILURE
            }
        };
    }
    status
}

fn wait_child(pid: Pid) -> nix::Result<WaitStatus> {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            other => return other,
        }
    }
}
