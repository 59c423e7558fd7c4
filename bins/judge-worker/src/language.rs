// Per-language build and run command construction
use crate::config::Toolchains;
use crate::runner::CommandSpec;
use judge_common::types::Language;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LanguageError {
    #[error("Unsupported language: {0}")]
    Unsupported(String),
}

/// Language-specific compile/run contract.
///
/// Adapters only build command lines; they never spawn anything themselves.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Fixed entry-point file name inside the working directory
    fn source_file(&self) -> &'static str;

    /// Write the submitted source into `work_dir` and return its path
    fn materialize(&self, work_dir: &Path, code: &str) -> io::Result<PathBuf> {
        let path = work_dir.join(self.source_file());
        fs::write(&path, code)?;
        Ok(path)
    }

    /// `None` for interpreted languages
    fn compile_command(&self, source: &Path) -> Option<CommandSpec>;

    /// Command for one test case; `input` is fed on stdin
    fn run_command(&self, work_dir: &Path, input: &str) -> CommandSpec;
}

/// Resolve the adapter for a submission's language tag
pub fn adapter_for(
    tag: &str,
    toolchains: &Toolchains,
    memory_limit_kb: Option<u64>,
) -> Result<Box<dyn LanguageAdapter>, LanguageError> {
    let language =
        Language::from_tag(tag).ok_or_else(|| LanguageError::Unsupported(tag.to_string()))?;

    let adapter: Box<dyn LanguageAdapter> = match language {
        Language::C => Box::new(CAdapter {
            compiler: toolchains.gcc.clone(),
        }),
        Language::Cpp => Box::new(CppAdapter {
            compiler: toolchains.gxx.clone(),
        }),
        Language::Java => Box::new(JavaAdapter {
            compiler: toolchains.javac.clone(),
            runtime: toolchains.java.clone(),
            max_heap_mb: memory_limit_kb.map(|kb| kb.div_ceil(1024).max(16)),
        }),
        Language::Python => Box::new(PythonAdapter {
            interpreter: toolchains.python.clone(),
        }),
        Language::Rust => Box::new(RustAdapter {
            compiler: toolchains.rustc.clone(),
        }),
    };
    Ok(adapter)
}

fn parent_dir(source: &Path) -> PathBuf {
    source
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn native_run(work_dir: &Path, input: &str) -> CommandSpec {
    CommandSpec::new(path_arg(&work_dir.join("main")))
        .current_dir(work_dir)
        .stdin(input)
}

#[derive(Debug, Clone)]
pub struct CAdapter {
    compiler: String,
}

impl LanguageAdapter for CAdapter {
    fn language(&self) -> Language {
        Language::C
    }

    fn source_file(&self) -> &'static str {
        "main.c"
    }

    fn compile_command(&self, source: &Path) -> Option<CommandSpec> {
        let dir = parent_dir(source);
        Some(
            CommandSpec::new(&self.compiler)
                .args(["-O2", "-std=c11"])
                .arg(path_arg(source))
                .arg("-o")
                .arg(path_arg(&dir.join("main")))
                .arg("-lm")
                .current_dir(dir),
        )
    }

    fn run_command(&self, work_dir: &Path, input: &str) -> CommandSpec {
        native_run(work_dir, input)
    }
}

#[derive(Debug, Clone)]
pub struct CppAdapter {
    compiler: String,
}

impl LanguageAdapter for CppAdapter {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn source_file(&self) -> &'static str {
        "main.cpp"
    }

    fn compile_command(&self, source: &Path) -> Option<CommandSpec> {
        let dir = parent_dir(source);
        Some(
            CommandSpec::new(&self.compiler)
                .args(["-O2", "-std=c++17"])
                .arg(path_arg(source))
                .arg("-o")
                .arg(path_arg(&dir.join("main")))
                .current_dir(dir),
        )
    }

    fn run_command(&self, work_dir: &Path, input: &str) -> CommandSpec {
        native_run(work_dir, input)
    }
}

#[derive(Debug, Clone)]
pub struct JavaAdapter {
    compiler: String,
    runtime: String,
    max_heap_mb: Option<u64>,
}

impl LanguageAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    fn source_file(&self) -> &'static str {
        "Main.java"
    }

    fn compile_command(&self, source: &Path) -> Option<CommandSpec> {
        Some(
            CommandSpec::new(&self.compiler)
                .args(["-encoding", "utf-8"])
                .arg(path_arg(source))
                .current_dir(parent_dir(source)),
        )
    }

    fn run_command(&self, work_dir: &Path, input: &str) -> CommandSpec {
        let mut cmd = CommandSpec::new(&self.runtime);
        if let Some(mb) = self.max_heap_mb {
            cmd = cmd.arg(format!("-Xmx{}m", mb));
        }
        cmd.arg("-Dfile.encoding=UTF-8")
            .arg("-cp")
            .arg(path_arg(work_dir))
            .arg("Main")
            .current_dir(work_dir)
            .stdin(input)
    }
}

#[derive(Debug, Clone)]
pub struct PythonAdapter {
    interpreter: String,
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn source_file(&self) -> &'static str {
        "main.py"
    }

    fn compile_command(&self, _source: &Path) -> Option<CommandSpec> {
        None
    }

    fn run_command(&self, work_dir: &Path, input: &str) -> CommandSpec {
        CommandSpec::new(&self.interpreter)
            .arg(path_arg(&work_dir.join(self.source_file())))
            .current_dir(work_dir)
            .stdin(input)
    }
}

#[derive(Debug, Clone)]
pub struct RustAdapter {
    compiler: String,
}

impl LanguageAdapter for RustAdapter {
    fn language(&self) -> Language {
        Language::Rust
    }

    fn source_file(&self) -> &'static str {
        "main.rs"
    }

    fn compile_command(&self, source: &Path) -> Option<CommandSpec> {
        let dir = parent_dir(source);
        Some(
            CommandSpec::new(&self.compiler)
                .arg("-O")
                .arg(path_arg(source))
                .arg("-o")
                .arg(path_arg(&dir.join("main")))
                .current_dir(dir),
        )
    }

    fn run_command(&self, work_dir: &Path, input: &str) -> CommandSpec {
        native_run(work_dir, input)
    }
}
