//! In-memory fakes shared by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::error::{SupervisorError, VcsError};
use crate::executor::{
    AccessRules, ProgressEvent, ProgressSink, Purpose, TaskInvocation, TaskResult, TaskRunner,
};
use crate::isolation::{CommitOutcome, MergeOutcome, Vcs, VcsOutcome};
use crate::plan::{AgentRole, Task};
use crate::runner::{
    AgentEvent, AgentExit, AgentInvoker, AgentRequest, AgentSession, ControlMessage,
    ProcessHandle, ProcessTarget, Signal,
};

pub(crate) fn task(id: &str, deps: &[&str]) -> Task {
    Task {
        id: id.to_string(),
        title: id.to_string(),
        agent_role: AgentRole::Implementer,
        files: Vec::new(),
        depends: deps.iter().map(|d| d.to_string()).collect(),
        test_files: Vec::new(),
        description: String::new(),
    }
}

pub(crate) fn result_with_code(task: &Task, code: i32) -> TaskResult {
    TaskResult {
        exit_code: code,
        ..TaskResult::failure(task, "")
    }
}

pub(crate) fn request(id: &str, role: AgentRole) -> AgentRequest {
    AgentRequest {
        task_id: id.to_string(),
        role,
        instructions: format!("do {id}"),
        workdir: PathBuf::from("/repo"),
        access: AccessRules::default(),
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// agent process

pub(crate) enum Step {
    Event(AgentEvent),
    /// Exit with this code and stdout once every queued event was consumed.
    Exit(i32, &'static str),
    /// Block until the agent is terminated.
    Hang,
    /// Block until one of the agent's children got a signal.
    WaitForInterrupt,
}

pub(crate) struct FakeProcess {
    children: Vec<u32>,
    signals: Mutex<Vec<(ProcessTarget, Signal)>>,
    changed: watch::Sender<u64>,
}

impl FakeProcess {
    fn new(children: Vec<u32>) -> Self {
        Self {
            children,
            signals: Mutex::new(Vec::new()),
            changed: watch::channel(0).0,
        }
    }

    pub(crate) fn signals(&self) -> Vec<(ProcessTarget, Signal)> {
        lock(&self.signals).clone()
    }

    fn got_signal(&self, target: ProcessTarget) -> bool {
        lock(&self.signals).iter().any(|(t, _)| *t == target)
    }

    async fn wait_until(&self, rx: &mut watch::Receiver<u64>, done: impl Fn(&Self) -> bool) {
        loop {
            if done(self) {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl ProcessHandle for FakeProcess {
    fn id(&self) -> Option<u32> {
        Some(1000)
    }

    fn children(&self) -> Vec<u32> {
        self.children
            .iter()
            .copied()
            .filter(|pid| !self.got_signal(ProcessTarget::Pid(*pid)))
            .collect()
    }

    fn signal(&self, target: ProcessTarget, signal: Signal) -> anyhow::Result<()> {
        lock(&self.signals).push((target, signal));
        self.changed.send_modify(|v| *v += 1);
        Ok(())
    }

    fn is_alive(&self, target: ProcessTarget) -> bool {
        !self.got_signal(target)
    }
}

/// `AgentInvoker` that plays one scripted session per `start`.
pub(crate) struct ScriptedInvoker {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    children: Vec<u32>,
    requests: Mutex<Vec<AgentRequest>>,
    control: Arc<Mutex<Vec<ControlMessage>>>,
    last: Mutex<Option<Arc<FakeProcess>>>,
}

impl ScriptedInvoker {
    pub(crate) fn new(script: Vec<Step>) -> Self {
        Self::sequence(vec![script])
    }

    /// One script per consecutive start; later starts exit cleanly.
    pub(crate) fn sequence(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            children: Vec::new(),
            requests: Mutex::new(Vec::new()),
            control: Arc::new(Mutex::new(Vec::new())),
            last: Mutex::new(None),
        }
    }

    pub(crate) fn with_children(mut self, pids: Vec<u32>) -> Self {
        self.children = pids;
        self
    }

    pub(crate) fn starts(&self) -> usize {
        lock(&self.requests).len()
    }

    pub(crate) fn requests(&self) -> Vec<AgentRequest> {
        lock(&self.requests).clone()
    }

    pub(crate) fn control_messages(&self) -> Vec<ControlMessage> {
        lock(&self.control).clone()
    }

    /// Process of the most recent session.
    pub(crate) fn process(&self) -> Arc<FakeProcess> {
        lock(&self.last).clone().expect("no session started")
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self, request: &AgentRequest) -> Result<AgentSession, SupervisorError> {
        lock(&self.requests).push(request.clone());
        let script = lock(&self.scripts)
            .pop_front()
            .unwrap_or_else(|| vec![Step::Exit(0, "")]);

        let process = Arc::new(FakeProcess::new(self.children.clone()));
        *lock(&self.last) = Some(process.clone());

        let (event_tx, event_rx) = mpsc::channel(1);
        let (control_tx, mut control_rx) = mpsc::channel::<ControlMessage>(16);
        let (exit_tx, exit_rx) = oneshot::channel();

        let seen = self.control.clone();
        tokio::spawn(async move {
            while let Some(msg) = control_rx.recv().await {
                lock(&seen).push(msg);
            }
        });
        tokio::spawn(play(script, event_tx, exit_tx, process.clone()));

        Ok(AgentSession {
            events: event_rx,
            control: control_tx,
            process,
            exit: exit_rx,
        })
    }
}

async fn play(
    script: Vec<Step>,
    events: mpsc::Sender<AgentEvent>,
    exit: oneshot::Sender<AgentExit>,
    process: Arc<FakeProcess>,
) {
    let mut changes = process.changed.subscribe();
    let root_dead = |p: &FakeProcess| !p.is_alive(ProcessTarget::Root);

    for step in script {
        if root_dead(&process) {
            break;
        }
        match step {
            Step::Event(ev) => {
                tokio::select! {
                    sent = events.send(ev) => if sent.is_err() { break },
                    _ = process.wait_until(&mut changes, root_dead) => break,
                }
            }
            Step::Exit(code, stdout) => {
                while events.capacity() < events.max_capacity() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                let _ = exit.send(AgentExit {
                    exit_code: code,
                    stdout: stdout.to_string(),
                    stderr: String::new(),
                });
                return;
            }
            Step::Hang => process.wait_until(&mut changes, root_dead).await,
            Step::WaitForInterrupt => {
                process
                    .wait_until(&mut changes, |p| {
                        root_dead(p)
                            || p.signals()
                                .iter()
                                .any(|(t, _)| matches!(t, ProcessTarget::Pid(_)))
                    })
                    .await
            }
        }
    }

    let exit_code = if root_dead(&process) { 143 } else { 0 };
    let _ = exit.send(AgentExit {
        exit_code,
        ..Default::default()
    });
}

// ---------------------------------------------------------------------------
// task runner and progress

/// `TaskRunner` that succeeds unless told otherwise and logs every call.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    vcs: Option<Arc<FakeVcs>>,
    /// task id -> (exit code, fail only the first primary run)
    failures: HashMap<String, (i32, bool)>,
    /// task id -> extra file its successful primary run writes
    extra_writes: HashMap<String, String>,
    cancel_after: Mutex<Option<(String, CancellationToken)>>,
    log: Mutex<Vec<TaskInvocation>>,
}

impl ScriptedRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Successful primary runs write `<id>.txt` into their workdir.
    pub(crate) fn writing(mut self, vcs: Arc<FakeVcs>) -> Self {
        self.vcs = Some(vcs);
        self
    }

    /// Also write `file`, e.g. to make two tasks touch the same path.
    pub(crate) fn also_writes(mut self, id: &str, file: &str) -> Self {
        self.extra_writes.insert(id.to_string(), file.to_string());
        self
    }

    pub(crate) fn fail(mut self, id: &str, code: i32) -> Self {
        self.failures.insert(id.to_string(), (code, false));
        self
    }

    pub(crate) fn fail_once(mut self, id: &str, code: i32) -> Self {
        self.failures.insert(id.to_string(), (code, true));
        self
    }

    pub(crate) fn cancel_after(&self, id: &str, token: CancellationToken) {
        *lock(&self.cancel_after) = Some((id.to_string(), token));
    }

    fn primaries(&self) -> Vec<TaskInvocation> {
        lock(&self.log)
            .iter()
            .filter(|i| i.purpose == Purpose::Primary)
            .cloned()
            .collect()
    }

    pub(crate) fn order(&self) -> Vec<String> {
        self.primaries().into_iter().map(|i| i.task.id).collect()
    }

    pub(crate) fn workdirs(&self, id: &str) -> Vec<PathBuf> {
        self.primaries()
            .into_iter()
            .filter(|i| i.task.id == id)
            .map(|i| i.workdir)
            .collect()
    }

    pub(crate) fn primary_runs(&self, id: &str) -> usize {
        self.workdirs(id).len()
    }

    pub(crate) fn fixes(&self) -> Vec<TaskInvocation> {
        lock(&self.log)
            .iter()
            .filter(|i| matches!(i.purpose, Purpose::Fix { .. }))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TaskRunner for ScriptedRunner {
    async fn run(&self, invocation: &TaskInvocation) -> TaskResult {
        let id = invocation.task.id.clone();
        let primary = invocation.purpose == Purpose::Primary;
        let earlier = self.primary_runs(&id);
        lock(&self.log).push(invocation.clone());
        tokio::task::yield_now().await;

        let code = match self.failures.get(&id) {
            Some(&(code, once)) if primary && (!once || earlier == 0) => code,
            _ => 0,
        };
        if code == 0 && primary {
            if let Some(vcs) = &self.vcs {
                vcs.write_file(&invocation.workdir, &format!("{id}.txt"));
                if let Some(extra) = self.extra_writes.get(&id) {
                    vcs.write_file(&invocation.workdir, extra);
                }
            }
        }
        if let Some((trigger, token)) = lock(&self.cancel_after).as_ref() {
            if *trigger == id {
                token.cancel();
            }
        }

        TaskResult {
            id: if primary { id.clone() } else { format!("{id}#fix") },
            title: invocation.task.title.clone(),
            agent_role: invocation.role(),
            exit_code: code,
            output: format!("ran {id}"),
            diagnostic: if code == 0 {
                String::new()
            } else {
                "scripted failure".to_string()
            },
            duration_ms: 0,
            timed_out: false,
        }
    }
}

#[derive(Default)]
pub(crate) struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub(crate) fn events(&self) -> Vec<ProgressEvent> {
        lock(&self.events).clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn name(&self) -> &str {
        "recording"
    }

    fn emit(&self, event: &ProgressEvent) {
        lock(&self.events).push(event.clone());
    }
}

// ---------------------------------------------------------------------------
// version control

#[derive(Debug, Clone, Default)]
struct Branch {
    commits: Vec<String>,
    /// file -> commit that last wrote it
    files: BTreeMap<String, String>,
    /// `files` at the moment the branch was created
    base: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Repo {
    is_repo: bool,
    branches: BTreeMap<String, Branch>,
    worktrees: Vec<(PathBuf, String)>,
    pending: HashMap<PathBuf, Vec<String>>,
    dirty: HashSet<PathBuf>,
    merging: HashSet<PathBuf>,
    next_commit: u32,
    calls: Vec<String>,
}

impl Repo {
    fn branch_at(&self, dir: &Path) -> Result<String, VcsError> {
        self.worktrees
            .iter()
            .find(|(p, _)| p == dir)
            .map(|(_, b)| b.clone())
            .ok_or_else(|| VcsError::NotARepository(dir.display().to_string()))
    }

    fn branch(&self, name: &str) -> Result<&Branch, VcsError> {
        self.branches.get(name).ok_or_else(|| VcsError::Command {
            args: format!("rev-parse {name}"),
            stderr: "unknown branch".into(),
        })
    }

    fn is_dirty(&self, dir: &Path) -> bool {
        self.dirty.contains(dir) || self.pending.get(dir).is_some_and(|p| !p.is_empty())
    }

    fn commit(&mut self, dir: &Path) -> Result<CommitOutcome, VcsError> {
        if !self.is_dirty(dir) {
            return Ok(CommitOutcome::NothingToCommit);
        }
        let name = self.branch_at(dir)?;
        self.next_commit += 1;
        let id = format!("c{}", self.next_commit);
        let files = self.pending.remove(dir).unwrap_or_default();
        self.dirty.remove(dir);

        let branch = self.branches.entry(name.clone()).or_default();
        branch.commits.push(id.clone());
        for f in files {
            branch.files.insert(f, id.clone());
        }
        self.calls.push(format!("commit {name}"));
        Ok(CommitOutcome::Committed { id })
    }

    fn create_branch(&mut self, name: &str, from: &str) -> Result<(), VcsError> {
        let parent = self.branch(from)?.clone();
        self.branches.insert(
            name.to_string(),
            Branch {
                commits: parent.commits,
                base: parent.files.clone(),
                files: parent.files,
            },
        );
        Ok(())
    }
}

/// In-memory repository rooted at `/repo` with `main` checked out.
pub(crate) struct FakeVcs {
    repo: Mutex<Repo>,
}

impl FakeVcs {
    pub(crate) fn new() -> Self {
        let mut repo = Repo {
            is_repo: true,
            next_commit: 0,
            ..Default::default()
        };
        repo.branches.insert(
            "main".into(),
            Branch {
                commits: vec!["c0".into()],
                ..Default::default()
            },
        );
        repo.worktrees.push((PathBuf::from("/repo"), "main".into()));
        Self {
            repo: Mutex::new(repo),
        }
    }

    pub(crate) fn not_a_repository() -> Self {
        Self {
            repo: Mutex::new(Repo::default()),
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        lock(&self.repo).calls.clone()
    }

    pub(crate) fn set_dirty(&self, dir: &Path, dirty: bool) {
        let mut repo = lock(&self.repo);
        if dirty {
            repo.dirty.insert(dir.to_path_buf());
        } else {
            repo.dirty.remove(dir);
        }
    }

    pub(crate) fn is_dirty(&self, dir: &Path) -> bool {
        lock(&self.repo).is_dirty(dir)
    }

    pub(crate) fn head(&self, dir: &Path) -> String {
        let repo = lock(&self.repo);
        let name = repo.branch_at(dir).expect("worktree");
        repo.branches[&name].commits.last().cloned().unwrap_or_default()
    }

    pub(crate) fn create_branch(&self, name: &str, from: &str) {
        lock(&self.repo).create_branch(name, from).expect("parent branch");
    }

    pub(crate) fn branch_exists_now(&self, name: &str) -> bool {
        lock(&self.repo).branches.contains_key(name)
    }

    pub(crate) fn branch_files(&self, name: &str) -> Vec<String> {
        lock(&self.repo)
            .branches
            .get(name)
            .map(|b| b.files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn write_file(&self, dir: &Path, file: &str) {
        lock(&self.repo)
            .pending
            .entry(dir.to_path_buf())
            .or_default()
            .push(file.to_string());
    }

    pub(crate) fn commit_in(&self, dir: &Path) {
        lock(&self.repo).commit(dir).expect("commit");
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, Repo>, VcsError> {
        let repo = lock(&self.repo);
        if repo.is_repo {
            Ok(repo)
        } else {
            Err(VcsError::NotARepository("/repo".into()))
        }
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn is_repository(&self, _dir: &Path) -> Result<bool, VcsError> {
        Ok(lock(&self.repo).is_repo)
    }

    async fn current_branch(&self, dir: &Path) -> Result<String, VcsError> {
        self.guard()?.branch_at(dir)
    }

    async fn head_id(&self, dir: &Path) -> Result<String, VcsError> {
        Ok(self.head(dir))
    }

    async fn has_uncommitted_changes(&self, dir: &Path) -> Result<bool, VcsError> {
        Ok(self.guard()?.is_dirty(dir))
    }

    async fn commit_all(&self, dir: &Path, _message: &str) -> Result<CommitOutcome, VcsError> {
        self.guard()?.commit(dir)
    }

    async fn undo_commit(&self, dir: &Path) -> Result<(), VcsError> {
        let mut repo = self.guard()?;
        let name = repo.branch_at(dir)?;
        if let Some(branch) = repo.branches.get_mut(&name) {
            branch.commits.pop();
        }
        repo.dirty.insert(dir.to_path_buf());
        repo.calls.push(format!("reset --soft {name}"));
        Ok(())
    }

    async fn branch_exists(&self, _repo: &Path, branch: &str) -> Result<bool, VcsError> {
        Ok(self.guard()?.branches.contains_key(branch))
    }

    async fn add_worktree(
        &self,
        _repo: &Path,
        path: &Path,
        branch: &str,
        base: Option<&str>,
    ) -> Result<(), VcsError> {
        let mut repo = self.guard()?;
        match base {
            Some(base) => {
                if repo.branches.contains_key(branch) {
                    return Err(VcsError::Command {
                        args: format!("worktree add -b {branch}"),
                        stderr: "branch already exists".into(),
                    });
                }
                repo.create_branch(branch, base)?;
                repo.calls.push(format!("worktree add {branch} from {base}"));
            }
            None => {
                repo.branch(branch)?;
                repo.calls.push(format!("worktree add {branch} (existing)"));
            }
        }
        repo.worktrees.push((path.to_path_buf(), branch.to_string()));
        Ok(())
    }

    async fn remove_worktree(&self, _repo: &Path, path: &Path) -> Result<VcsOutcome, VcsError> {
        let mut repo = self.guard()?;
        repo.calls.push(format!("worktree remove {}", path.display()));
        let before = repo.worktrees.len();
        repo.worktrees.retain(|(p, _)| p != path);
        repo.pending.remove(path);
        repo.dirty.remove(path);
        Ok(if repo.worktrees.len() < before {
            VcsOutcome::Applied
        } else {
            VcsOutcome::Inapplicable
        })
    }

    async fn list_worktrees(&self, _repo: &Path) -> Result<Vec<(PathBuf, Option<String>)>, VcsError> {
        Ok(self
            .guard()?
            .worktrees
            .iter()
            .map(|(p, b)| (p.clone(), Some(b.clone())))
            .collect())
    }

    async fn prune_worktrees(&self, _repo: &Path) -> Result<(), VcsError> {
        self.guard()?.calls.push("worktree prune".into());
        Ok(())
    }

    async fn delete_branch(&self, _repo: &Path, branch: &str) -> Result<VcsOutcome, VcsError> {
        let mut repo = self.guard()?;
        repo.calls.push(format!("branch -D {branch}"));
        Ok(match repo.branches.remove(branch) {
            Some(_) => VcsOutcome::Applied,
            None => VcsOutcome::Inapplicable,
        })
    }

    async fn list_branches(&self, _repo: &Path, prefix: &str) -> Result<Vec<String>, VcsError> {
        Ok(self
            .guard()?
            .branches
            .keys()
            .filter(|b| b.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn commits_ahead(&self, _repo: &Path, base: &str, branch: &str) -> Result<u32, VcsError> {
        let repo = self.guard()?;
        let base = repo.branch(base)?;
        let branch = repo.branch(branch)?;
        Ok(branch
            .commits
            .iter()
            .filter(|c| !base.commits.contains(c))
            .count() as u32)
    }

    async fn merge(&self, dir: &Path, branch: &str, _message: &str) -> Result<MergeOutcome, VcsError> {
        let mut repo = self.guard()?;
        let target_name = repo.branch_at(dir)?;
        repo.calls.push(format!("merge {branch} into {target_name}"));

        let source = repo.branch(branch)?.clone();
        let target = repo.branch(&target_name)?.clone();
        let changed: Vec<(&String, &String)> = source
            .files
            .iter()
            .filter(|(f, v)| source.base.get(*f) != Some(*v))
            .collect();
        let conflicts: Vec<String> = changed
            .iter()
            .filter(|(f, v)| {
                let ours = target.files.get(*f);
                ours != source.base.get(*f) && ours != Some(*v)
            })
            .map(|(f, _)| f.to_string())
            .collect();
        if !conflicts.is_empty() {
            repo.merging.insert(dir.to_path_buf());
            return Ok(MergeOutcome::Conflict {
                files: conflicts,
                detail: "automatic merge failed".into(),
            });
        }

        repo.next_commit += 1;
        let merge_commit = format!("c{}", repo.next_commit);
        let updated = repo.branches.entry(target_name).or_default();
        for (f, v) in changed {
            updated.files.insert(f.clone(), v.clone());
        }
        for c in &source.commits {
            if !updated.commits.contains(c) {
                updated.commits.push(c.clone());
            }
        }
        updated.commits.push(merge_commit);
        Ok(MergeOutcome::Merged)
    }

    async fn abort_merge(&self, dir: &Path) -> Result<VcsOutcome, VcsError> {
        let mut repo = self.guard()?;
        repo.calls.push(format!("merge --abort {}", dir.display()));
        Ok(if repo.merging.remove(dir) {
            VcsOutcome::Applied
        } else {
            VcsOutcome::Inapplicable
        })
    }
}
