//! Shared fixtures for bgav integration tests.
//!
//! Every test builds its own project repository, dependency repository and
//! local Maven repository in temp directories.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use bgav::config::BgavConfig;
use bgav::{ReconciliationSession, Result, RunOptions, SessionReport};
use tempfile::TempDir;

pub const TICKET_BRANCH: &str = "feature/NCX-9-login";

/// Run git in `dir`, panicking on failure; returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git must be installed");
    assert!(
        out.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_owned()
}

pub fn write(dir: &Path, rel: &str, body: &str) {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

pub fn read(dir: &Path, rel: &str) -> String {
    std::fs::read_to_string(dir.join(rel)).unwrap()
}

/// Canonical path of a temp dir, so paths match what git reports.
pub fn canonical(dir: &TempDir) -> PathBuf {
    dir.path().canonicalize().unwrap()
}

pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-b", "main"]);
    git(dir, &["config", "user.email", "test@test.com"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

pub fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-m", message]);
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

const DISTRIBUTION: &str = "  <distributionManagement>
    <repository><id>releases</id><url>https://repo.example/releases</url></repository>
    <snapshotRepository><id>snapshots</id><url>https://repo.example/snapshots</url></snapshotRepository>
  </distributionManagement>
";

/// Single-module application depending on `io.crowdcode:lib` through a
/// `lib.version` property.
pub fn app_pom(version: &str, lib_version: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<project>
  <modelVersion>4.0.0</modelVersion>
  <groupId>io.crowdcode</groupId>
  <artifactId>app</artifactId>
  <version>{version}</version>
  <properties>
    <lib.version>{lib_version}</lib.version>
  </properties>
{DISTRIBUTION}  <dependencies>
    <dependency>
      <groupId>io.crowdcode</groupId>
      <artifactId>lib</artifactId>
      <version>${{lib.version}}</version>
    </dependency>
    <dependency>
      <groupId>org.slf4j</groupId>
      <artifactId>slf4j-api</artifactId>
      <version>2.0.9</version>
    </dependency>
  </dependencies>
</project>
"
    )
}

/// Aggregator `parent` with modules `core` and `web`; `web` depends on its
/// sibling `core` and on `io.crowdcode:lib`.
pub fn write_multi_module(dir: &Path, version: &str, lib_version: &str) {
    write(
        dir,
        "pom.xml",
        &format!(
            "<project>
  <groupId>io.crowdcode</groupId>
  <artifactId>parent</artifactId>
  <version>{version}</version>
  <packaging>pom</packaging>
  <modules>
    <module>core</module>
    <module>web</module>
  </modules>
{DISTRIBUTION}</project>
"
        ),
    );
    let parent = format!(
        "  <parent>
    <groupId>io.crowdcode</groupId>
    <artifactId>parent</artifactId>
    <version>{version}</version>
  </parent>
"
    );
    write(
        dir,
        "core/pom.xml",
        &format!("<project>\n{parent}  <artifactId>core</artifactId>\n</project>\n"),
    );
    write(
        dir,
        "web/pom.xml",
        &format!(
            "<project>
{parent}  <artifactId>web</artifactId>
  <properties>
    <lib.version>{lib_version}</lib.version>
  </properties>
  <dependencies>
    <dependency>
      <groupId>io.crowdcode</groupId>
      <artifactId>core</artifactId>
      <version>{version}</version>
    </dependency>
    <dependency>
      <groupId>io.crowdcode</groupId>
      <artifactId>lib</artifactId>
      <version>${{lib.version}}</version>
    </dependency>
  </dependencies>
</project>
"
        ),
    );
}

fn lib_pom(version: &str, scm_url: &str) -> String {
    format!(
        "<project>
  <groupId>io.crowdcode</groupId>
  <artifactId>lib</artifactId>
  <version>{version}</version>
  <scm>
    <url>{scm_url}</url>
  </scm>
</project>
"
    )
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// A project repository plus everything its watched dependency needs.
pub struct Fixture {
    pub project: TempDir,
    pub dependency: TempDir,
    pub m2: TempDir,
}

impl Fixture {
    /// `branch_version`: version of `lib` on its `feature/NCX-9-api`
    /// branch; `None` leaves the dependency repository without one.
    pub fn new(branch_version: Option<&str>) -> Self {
        let dependency = TempDir::new().unwrap();
        let dep = canonical(&dependency);
        init_repo(&dep);
        let url = dep.to_string_lossy().into_owned();
        write(&dep, "pom.xml", &lib_pom("3.0-SNAPSHOT", &url));
        commit_all(&dep, "lib");

        let m2 = TempDir::new().unwrap();
        write(
            m2.path(),
            "io/crowdcode/lib/3.0-SNAPSHOT/lib-3.0-SNAPSHOT.pom",
            &lib_pom("3.0-SNAPSHOT", &url),
        );

        let project = TempDir::new().unwrap();
        init_repo(&canonical(&project));

        let fixture = Self {
            project,
            dependency,
            m2,
        };
        if let Some(version) = branch_version {
            fixture.add_dependency_branch(version);
        }
        fixture
    }

    /// Create `lib`'s `feature/NCX-9-api` branch with `version`.
    pub fn add_dependency_branch(&self, version: &str) {
        let dep = canonical(&self.dependency);
        let url = dep.to_string_lossy().into_owned();
        git(&dep, &["checkout", "-b", "feature/NCX-9-api"]);
        write(&dep, "pom.xml", &lib_pom(version, &url));
        commit_all(&dep, "NCX-9 api");
        git(&dep, &["checkout", "main"]);
    }

    pub fn dir(&self) -> PathBuf {
        canonical(&self.project)
    }

    /// Commit `files` on `main`, then switch to `branch`.
    pub fn commit_on(&self, branch: &str, files: impl FnOnce(&Path)) {
        let dir = self.dir();
        files(&dir);
        commit_all(&dir, "initial");
        if branch != "main" {
            git(&dir, &["checkout", "-b", branch]);
        }
    }

    /// Watches `io.crowdcode`, resolves from the fixture's local
    /// repository, never pushes.
    pub fn config(&self) -> BgavConfig {
        let mut config = BgavConfig::default();
        config.dependencies.watched = vec!["io.crowdcode".to_owned()];
        config.dependencies.local_repository = Some(canonical(&self.m2));
        config.git.suppress_push = true;
        config
    }

    pub fn run(&self) -> Result<SessionReport> {
        self.run_with(self.config(), RunOptions::new(self.dir()))
    }

    pub fn run_with(&self, config: BgavConfig, options: RunOptions) -> Result<SessionReport> {
        ReconciliationSession::new(config, options).run()
    }

    pub fn head_subject(&self) -> String {
        git(&self.dir(), &["log", "-1", "--format=%s"])
    }

    pub fn status(&self) -> String {
        git(&self.dir(), &["status", "--porcelain"])
    }
}
