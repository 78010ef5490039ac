use super::executor;
use super::utils::{SourceKind, object_name, quote, replace_vars, std_flag};
use crate::config::{HookStage, PROJECT_FILE, ProjectInfo, TargetKind};
use crate::deps::{self, Resolved};
use crate::history::{BuildMode, FileHistory};
use crate::includes::FileDependencies;
use crate::platform::Platform;
use crate::toolchain::{ToolConfig, Toolchain};
use crate::ui;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed building {0}")]
    Failed(String),
    #[error("{project} {stage} commands failed")]
    Hooks {
        project: String,
        stage: &'static str,
    },
    #[error("{} does not exist, build it first", .0.display())]
    MissingArtifact(PathBuf),
}

/// Where a project keeps its sources, outputs and incremental state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub project_file: PathBuf,
    pub src: PathBuf,
    pub build: PathBuf,
    pub state: PathBuf,
    pub objfiles: PathBuf,
    pub filehist: PathBuf,
    pub filedeps: PathBuf,
    pub last_build: PathBuf,
    pub compile_commands: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let state = root.join(".pyr");
        let build = root.join("build");
        Self {
            project_file: root.join(PROJECT_FILE),
            src: root.join("src"),
            objfiles: state.join("objfiles"),
            filehist: state.join("filehist"),
            filedeps: state.join("filedeps"),
            last_build: state.join("last_build"),
            compile_commands: build.join("compile_commands.json"),
            build,
            state,
            root,
        }
    }
}

/// One `compile_commands.json` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileEntry {
    pub directory: String,
    pub command: String,
    pub file: String,
}

/// What a build has to do, computed from the staleness state.
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    /// Compile commands for stale translation units.
    pub compile: Vec<String>,
    /// Every translation unit's compile command, stale or not.
    pub entries: Vec<CompileEntry>,
    pub link: Option<String>,
    pub objects: Vec<PathBuf>,
    /// Sources and headers to mark current once the build ran.
    pub sources: Vec<PathBuf>,
}

impl BuildPlan {
    pub fn is_up_to_date(&self) -> bool {
        self.compile.is_empty() && self.link.is_none()
    }
}

fn mode_flags(mode: BuildMode) -> &'static str {
    match (mode.release, mode.obfuscate) {
        (true, true) => "-Wall -O3 -static -s -fvisibility=hidden -fvisibility-inlines-hidden",
        (true, false) => "-Wall -O3",
        (false, _) => "-Wall -Wextra -Wpedantic -g",
    }
}

/// A loaded project and its incremental state for one invocation.
pub struct Project {
    pub info: ProjectInfo,
    pub tools: ToolConfig,
    pub toolchain: Toolchain,
    pub layout: Layout,
    pub mode: BuildMode,
    pub history: FileHistory,
    pub deps: FileDependencies,
    resolved: Resolved,
    queued: [Vec<String>; 4],
}

impl Project {
    /// Load the project at `root`, discover the toolchain and read `.pyr/`.
    pub fn load(root: &Path, mode: BuildMode, platform: &Platform) -> Result<Self> {
        let layout = Layout::new(root);
        ui::info(format!("loading project file - {}", layout.project_file.display()));
        let info = ProjectInfo::load(&layout.project_file, platform)?;

        let tools = ToolConfig::load(platform)?;
        match &tools.path {
            Some(path) => ui::info(format!("loading config file - {}", path.display())),
            None => debug!("using built-in tool config"),
        }
        let toolchain = Toolchain::detect(&tools, info.kind == TargetKind::StaticLibrary)?;

        Self::from_parts(info, tools, toolchain, layout, mode)
    }

    /// Assemble a project from already-validated parts and queue its hooks.
    pub fn from_parts(
        info: ProjectInfo,
        tools: ToolConfig,
        toolchain: Toolchain,
        layout: Layout,
        mode: BuildMode,
    ) -> Result<Self> {
        let mut history = FileHistory::load(&layout.filehist)?;
        let deps = FileDependencies::load(&layout.filedeps)?;

        match BuildMode::load_marker(&layout.last_build) {
            Some(previous) if previous == mode => {}
            previous => {
                debug!(?previous, ?mode, "build mode changed, rebuilding everything");
                history.clear();
            }
        }

        let resolved = deps::resolve(&info.dependencies, &layout.root);
        let mut project = Project {
            info,
            tools,
            toolchain,
            layout,
            mode,
            history,
            deps,
            resolved,
            queued: Default::default(),
        };
        project.queue_hooks();
        Ok(project)
    }

    /// Queue the commands of every hook that is `__always__` or whose trigger
    /// changed, and mark those triggers current.
    fn queue_hooks(&mut self) {
        for stage in HookStage::ALL {
            for hook in self.info.hooks.stage(stage) {
                let queue = &mut self.queued[stage.index()];
                if hook.is_always() {
                    queue.extend(hook.commands.iter().cloned());
                    continue;
                }
                let trigger = self.layout.root.join(&hook.trigger);
                if !self.history.was_updated_transitive(&trigger, &self.deps, 0) {
                    continue;
                }
                debug!(trigger = %hook.trigger, stage = stage.name(), "hook triggered");
                queue.extend(hook.commands.iter().cloned());
                if let Err(e) = self.history.mark_current(&trigger) {
                    warn!(trigger = %trigger.display(), error = %e, "cannot stat hook trigger");
                }
            }
        }
    }

    pub fn queued(&self, stage: HookStage) -> &[String] {
        &self.queued[stage.index()]
    }

    pub fn artifact(&self) -> PathBuf {
        self.layout.build.join(self.info.artifact_name())
    }

    fn run_hooks(&mut self, stage: HookStage) -> Result<()> {
        let commands = std::mem::take(&mut self.queued[stage.index()]);
        if commands.is_empty() {
            return Ok(());
        }
        let label = format!("{} {} commands", self.info.name, stage.name());
        let ok = if stage.is_parallel() {
            executor::run_commands_parallel(commands, &label)
        } else {
            executor::run_commands(commands, &label)
        };
        if ok {
            Ok(())
        } else {
            Err(BuildError::Hooks {
                project: self.info.name.clone(),
                stage: stage.name(),
            }
            .into())
        }
    }

    /// Run pre-build hooks, then regenerate the config header if needed.
    pub fn pre_build(&mut self) -> Result<()> {
        self.run_hooks(HookStage::PreBuild)?;
        self.run_hooks(HookStage::PreBuildParallel)?;

        let Some(cfg_file) = &self.info.cfg_file else {
            return Ok(());
        };
        let header = self.layout.root.join(cfg_file);
        if !self.history.was_updated(&self.layout.project_file) && header.exists() {
            return Ok(());
        }
        ui::info(format!("configuring {}", cfg_file.display()));
        let template = self.tools.cfg_header_template();
        if let Some(parent) = header.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&header, replace_vars(&template, &self.info.variables()))
            .with_context(|| format!("Failed to write {}", header.display()))?;
        Ok(())
    }

    fn compile_command(&self, kind: SourceKind, source: &Path, object: &Path) -> String {
        let (compiler, standard) = match kind {
            SourceKind::C => (&self.toolchain.c_compiler, self.info.c_standard.as_deref()),
            _ => (&self.toolchain.cpp_compiler, self.info.cpp_standard.as_deref()),
        };
        let mut parts = vec![compiler.clone(), mode_flags(self.mode).to_string()];
        if let Some(standard) = standard {
            parts.push(std_flag(standard));
        }
        if self.info.kind == TargetKind::DynamicLibrary {
            parts.push("-fPIC".to_string());
        }
        for dir in &self.resolved.include_dirs {
            parts.push(format!("-I{}", quote(&self.layout.root.join(dir))));
        }
        parts.push("-c -o".to_string());
        parts.push(quote(object));
        parts.push(quote(source));
        parts.join(" ")
    }

    fn link_command(&self, objects: &[PathBuf]) -> String {
        let artifact = quote(&self.artifact());
        let objects = objects.iter().map(|o| quote(o)).collect::<Vec<_>>().join(" ");
        if self.info.kind == TargetKind::StaticLibrary {
            return format!("{} rcs {artifact} {objects}", self.toolchain.archiver);
        }

        let mut parts = vec![self.toolchain.link_driver()];
        if self.info.kind == TargetKind::DynamicLibrary {
            parts.push("-shared".to_string());
        }
        parts.push(format!("-o {artifact}"));
        parts.push(objects);
        let libs = self.info.libs.iter().chain(&self.resolved.link_libs);
        parts.extend(libs.map(|lib| format!("-l{lib}")));
        parts.join(" ")
    }

    /// Decide which translation units are stale and whether to link.
    /// Rescans the includes of every changed file as a side effect.
    pub fn plan(&mut self) -> Result<BuildPlan> {
        let mut plan = BuildPlan::default();
        let directory = self.layout.root.display().to_string();

        let walker = WalkDir::new(&self.layout.src).sort_by_file_name();
        for entry in walker {
            let entry = entry.with_context(|| {
                format!("Failed to walk {}", self.layout.src.display())
            })?;
            if entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            let kind = SourceKind::classify(path);

            let stale = if self.history.was_updated(path) {
                if kind.is_some()
                    && let Err(e) = self.deps.rescan(path)
                {
                    warn!(file = %path.display(), error = %e, "cannot scan includes");
                }
                true
            } else {
                self.history.was_updated_transitive(path, &self.deps, 0)
            };
            if kind.is_some() {
                plan.sources.push(path.to_path_buf());
            }

            let Some(kind) = kind.filter(|k| k.is_compiled()) else {
                continue;
            };
            let relative = path.strip_prefix(&self.layout.src).unwrap_or(path);
            let object = self.layout.objfiles.join(object_name(relative));
            let command = self.compile_command(kind, path, &object);
            debug!(file = %path.display(), stale, "translation unit");

            plan.entries.push(CompileEntry {
                directory: directory.clone(),
                command: command.clone(),
                file: path.display().to_string(),
            });
            if stale {
                plan.compile.push(command);
            }
            plan.objects.push(object);
        }

        if plan.objects.is_empty() {
            ui::warning(format!("no C or C++ sources in {}", self.layout.src.display()));
            return Ok(plan);
        }
        let relink = !plan.compile.is_empty()
            || !self.artifact().exists()
            || self.history.was_updated(&self.layout.project_file);
        if relink {
            let link = self.link_command(&plan.objects);
            debug!(command = %link, "link");
            plan.link = Some(link);
        }
        Ok(plan)
    }

    fn write_compile_commands(&self, entries: &[CompileEntry]) {
        let result = serde_json::to_string_pretty(entries)
            .map_err(anyhow::Error::from)
            .and_then(|json| fs::write(&self.layout.compile_commands, json).map_err(Into::into));
        if let Err(e) = result {
            warn!(error = %e, "failed writing compile_commands.json");
        }
    }

    /// Compile stale sources and link. Nothing is persisted when a command fails.
    pub fn build(&mut self) -> Result<()> {
        for dir in [&self.layout.objfiles, &self.layout.build] {
            fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let plan = self.plan()?;
        self.write_compile_commands(&plan.entries);

        let ok = if plan.is_up_to_date() {
            ui::info(format!("{} is up to date", self.info.name));
            true
        } else {
            executor::build_using(plan.compile, plan.link, &format!("building {}", self.info.name))
        };

        for source in &plan.sources {
            if let Err(e) = self.history.mark_current(source) {
                warn!(file = %source.display(), error = %e, "cannot stat source");
            }
        }
        if !ok {
            return Err(BuildError::Failed(self.info.name.clone()).into());
        }

        if let Err(e) = self.mode.save_marker(&self.layout.last_build) {
            ui::warning(format!("failed saving build mode: {e}"));
            self.recommend_deleting_history();
        }
        ui::success(format!("built {}", self.info.name));
        Ok(())
    }

    fn recommend_deleting_history(&self) {
        ui::note(format!(
            "deleting file history ({}) recommended",
            self.layout.filehist.display()
        ));
    }

    /// Persist the incremental state, then run post-build hooks.
    pub fn post_build(&mut self) -> Result<()> {
        if let Err(e) = self.history.mark_current(&self.layout.project_file) {
            warn!(error = %e, "cannot stat project file");
        }
        let pruned = self.history.prune_missing() + self.deps.prune_missing();
        if pruned > 0 {
            debug!(pruned, "dropped records of deleted files");
        }
        if let Err(e) = self.history.save(&self.layout.filehist) {
            ui::warning(format!("failed saving file history: {e}"));
        }
        if let Err(e) = self.deps.save(&self.layout.filedeps) {
            ui::warning(format!("failed saving file dependencies: {e}"));
            ui::warning("if file history was saved, project might not build correctly next time");
            self.recommend_deleting_history();
        }

        self.run_hooks(HookStage::PostBuild)?;
        self.run_hooks(HookStage::PostBuildParallel)
    }

    /// Run the built artifact and return its exit code.
    pub fn run(&self) -> Result<i32> {
        if !self.info.kind.is_runnable() {
            ui::note(format!("{} is a static library, nothing to run", self.info.name));
            return Ok(0);
        }
        let artifact = self.artifact();
        if !artifact.exists() {
            return Err(BuildError::MissingArtifact(artifact).into());
        }
        debug!(artifact = %artifact.display(), "running");
        let status = Command::new(&artifact)
            .current_dir(&self.layout.root)
            .status()
            .with_context(|| format!("Failed to run {}", artifact.display()))?;
        Ok(status.code().unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Version;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn toolchain() -> Toolchain {
        Toolchain {
            c_compiler: "cc".into(),
            cpp_compiler: "c++".into(),
            linker: "bfd".into(),
            archiver: "ar".into(),
        }
    }

    fn touch_later(path: &Path, secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(secs))
            .unwrap();
    }

    fn write(root: &Path, rel: &str, text: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, text).unwrap();
    }

    const PROJECT: &str = "\
[target]
\tname: demo
\ttype: executable
\tmacroname: DEMO
\tversion: 1.2.3.4
\tcfg-file: ${src}/cfg.hpp
[requirements]
\tc++-standard: c++17
\tlibs: m
[commands]
> pre-build
\t${src}/schema.txt: echo schema
\t__always__: echo always
";

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, PROJECT_FILE, PROJECT);
        write(root, "src/main.cpp", "#include \"util.h\"\nint main() { return f(); }\n");
        write(root, "src/util.h", "int f();\n");
        write(root, "src/util.c", "int f() { return 0; }\n");
        write(root, "src/net/conn.cpp", "#include \"../util.h\"\n");
        write(root, "src/schema.txt", "table\n");
        dir
    }

    fn open(root: &Path, mode: BuildMode) -> Project {
        let platform = Platform::from_idents(["unix"]);
        let info = ProjectInfo::load(&root.join(PROJECT_FILE), &platform).unwrap();
        Project::from_parts(info, ToolConfig::default(), toolchain(), Layout::new(root), mode)
            .unwrap()
    }

    /// Pretend the plan ran successfully and persist state.
    fn settle(project: &mut Project, plan: &BuildPlan) {
        for source in &plan.sources {
            project.history.mark_current(source).unwrap();
        }
        fs::create_dir_all(&project.layout.build).unwrap();
        fs::write(project.artifact(), "").unwrap();
        project.mode.save_marker(&project.layout.last_build).unwrap();
        project.post_build().unwrap();
    }

    #[test]
    fn test_only_changed_units_are_recompiled() {
        let dir = fixture();
        let root = dir.path();

        let mut project = open(root, BuildMode::default());
        let plan = project.plan().unwrap();
        assert_eq!(plan.compile.len(), 3);
        assert_eq!(plan.entries.len(), 3);
        assert_eq!(plan.sources.len(), 4);
        assert!(plan.link.is_some());
        settle(&mut project, &plan);

        let mut project = open(root, BuildMode::default());
        let plan = project.plan().unwrap();
        assert!(plan.is_up_to_date(), "{:?}", plan.compile);

        touch_later(&root.join("src/util.c"), 10);
        let mut project = open(root, BuildMode::default());
        let plan = project.plan().unwrap();
        assert_eq!(plan.compile.len(), 1);
        assert!(plan.compile[0].starts_with("cc -Wall -Wextra -Wpedantic -g"));
        assert!(plan.compile[0].contains("util.c.o"));
        let link = plan.link.as_deref().unwrap();
        assert!(link.starts_with("c++ -fuse-ld=bfd -o"));
        assert!(link.ends_with("-lm"));
    }

    #[test]
    fn test_header_change_recompiles_includers() {
        let dir = fixture();
        let root = dir.path();
        let mut project = open(root, BuildMode::default());
        let plan = project.plan().unwrap();
        settle(&mut project, &plan);

        touch_later(&root.join("src/util.h"), 10);
        let mut project = open(root, BuildMode::default());
        let plan = project.plan().unwrap();
        assert_eq!(plan.compile.len(), 2);
        assert!(plan.compile.iter().any(|c| c.contains("main.cpp.o")));
        assert!(plan.compile.iter().any(|c| c.contains("net_conn.cpp.o")));
        assert!(plan.compile.iter().all(|c| c.contains("-std=c++17")));
    }

    #[test]
    fn test_mode_change_rebuilds_everything() {
        let dir = fixture();
        let root = dir.path();
        let mut project = open(root, BuildMode::default());
        let plan = project.plan().unwrap();
        settle(&mut project, &plan);

        let release = BuildMode {
            release: true,
            obfuscate: false,
        };
        let mut project = open(root, release);
        let plan = project.plan().unwrap();
        assert_eq!(plan.compile.len(), 3);
        assert!(plan.compile.iter().all(|c| c.contains("-Wall -O3")));
    }

    #[test]
    fn test_hooks_fire_on_trigger_change() {
        let dir = fixture();
        let root = dir.path();
        let mut project = open(root, BuildMode::default());
        assert_eq!(
            project.queued(HookStage::PreBuild),
            ["echo schema", "echo always"]
        );
        let plan = project.plan().unwrap();
        settle(&mut project, &plan);

        let project = open(root, BuildMode::default());
        assert_eq!(project.queued(HookStage::PreBuild), ["echo always"]);

        touch_later(&root.join("src/schema.txt"), 10);
        let project = open(root, BuildMode::default());
        assert_eq!(project.queued(HookStage::PreBuild).len(), 2);
    }

    #[test]
    fn test_deleted_sources_leave_the_history() {
        let dir = fixture();
        let root = dir.path();
        let mut project = open(root, BuildMode::default());
        let plan = project.plan().unwrap();
        settle(&mut project, &plan);
        let util = root.join("src/util.c");
        assert!(project.history.recorded(&util).is_some());

        fs::remove_file(&util).unwrap();
        let mut project = open(root, BuildMode::default());
        let plan = project.plan().unwrap();
        settle(&mut project, &plan);
        assert!(project.history.recorded(&util).is_none());
        assert!(project.deps.get(&util).is_empty());

        let saved = fs::read_to_string(&project.layout.filehist).unwrap();
        assert!(!saved.contains("util.c "), "{saved}");
        assert!(saved.contains("main.cpp "));
    }

    #[cfg(unix)]
    #[test]
    fn test_marker_write_failure_still_counts_as_built() {
        let dir = fixture();
        let root = dir.path();
        let mut project = open(root, BuildMode::default());
        project.toolchain = Toolchain {
            c_compiler: "true".into(),
            cpp_compiler: "true".into(),
            linker: "true".into(),
            archiver: "true".into(),
        };
        fs::create_dir_all(&project.layout.last_build).unwrap();

        project.build().unwrap();
        assert!(project.layout.last_build.is_dir());
        assert!(!project.history.was_updated(&root.join("src/util.c")));
        project.queued = Default::default();
        project.post_build().unwrap();
        assert!(project.layout.filehist.is_file());
    }

    #[test]
    fn test_cfg_header_is_generated() {
        let dir = fixture();
        let root = dir.path();
        let mut project = open(root, BuildMode::default());
        project.queued = Default::default();
        project.pre_build().unwrap();

        let header = fs::read_to_string(root.join("src/cfg.hpp")).unwrap();
        assert!(header.contains("#define DEMO_VERSION_MAJOR 1"));
        assert!(header.contains("#define DEMO_VERSION_TWEAK 4"));
        assert!(header.contains("#define DEMO_NAME \"demo\""));
    }

    #[test]
    fn test_link_commands_per_target_kind() {
        let dir = fixture();
        let mut project = open(dir.path(), BuildMode::default());
        let objects = vec![PathBuf::from("a.o"), PathBuf::from("b.o")];

        project.info.kind = TargetKind::StaticLibrary;
        let archive = project.link_command(&objects);
        assert!(archive.starts_with("ar rcs "));
        assert!(archive.ends_with("\"a.o\" \"b.o\""));

        project.info.kind = TargetKind::DynamicLibrary;
        assert!(project.link_command(&objects).contains(" -shared -o "));
        let compile = project.compile_command(SourceKind::Cpp, Path::new("x.cpp"), Path::new("x.o"));
        assert!(compile.contains("-fPIC"));
    }

    #[test]
    fn test_version_flows_into_variables() {
        let dir = fixture();
        let project = open(dir.path(), BuildMode::default());
        assert_eq!(project.info.version, "1.2.3.4".parse::<Version>().unwrap());
    }
}
