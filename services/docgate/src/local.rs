//! Offline converters backed by external commands
//!
//! Each run gets its own scratch directory holding the input file and an
//! `out/` directory. The configured argv is expanded with:
//!
//! - `{input}`  path of the written input file
//! - `{output}` suggested output path (`out/output.<format>`)
//! - `{outdir}` the output directory
//!
//! The result is `{output}` when the command wrote it, otherwise the only
//! file the command left in `{outdir}` (tools like `soffice --outdir` pick
//! their own file names).

use std::path::{Path, PathBuf};

use provider::{Artifact, BoxFuture, ConversionRequest, LocalConverter, LocalError};
use tracing::{debug, instrument};

const MAX_STDERR_CHARS: usize = 512;
const MAX_FORMAT_LEN: usize = 16;
const MAX_FILE_NAME_LEN: usize = 128;

/// Output formats end up as file extensions in the command line: short and
/// ASCII alphanumeric only.
pub fn is_valid_format(format: &str) -> bool {
    !format.is_empty()
        && format.len() <= MAX_FORMAT_LEN
        && format.bytes().all(|b| b.is_ascii_alphanumeric())
}

pub struct CommandConverter {
    name: String,
    argv: Vec<String>,
    default_format: Option<String>,
}

impl CommandConverter {
    pub fn new(argv: Vec<String>, default_format: Option<String>) -> Self {
        let name = argv
            .first()
            .map(|program| {
                Path::new(program)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| program.clone())
            })
            .unwrap_or_default();
        Self {
            name,
            argv,
            default_format,
        }
    }

    fn output_format<'a>(&'a self, request: &'a ConversionRequest) -> &'a str {
        request
            .output_format
            .as_deref()
            .filter(|f| is_valid_format(f))
            .or(self.default_format.as_deref().filter(|f| is_valid_format(f)))
            .unwrap_or("out")
    }

    #[instrument(skip_all, fields(converter = %self.name, tool = %request.tool))]
    async fn run(&self, request: &ConversionRequest) -> Result<Artifact, LocalError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(LocalError::Failed("empty command".into()));
        };

        let scratch = tempfile::Builder::new().prefix("docgate-").tempdir()?;
        let outdir = scratch.path().join("out");
        tokio::fs::create_dir(&outdir).await?;

        let input = scratch.path().join(input_file_name(&request.input));
        tokio::fs::write(&input, &request.input.bytes).await?;
        let output = outdir.join(format!("output.{}", self.output_format(request)));

        let args: Vec<String> = args
            .iter()
            .map(|arg| expand(arg, &input, &output, &outdir))
            .collect();
        debug!(program = %program, ?args, "running local converter");

        let result = tokio::process::Command::new(program)
            .args(&args)
            .current_dir(scratch.path())
            .kill_on_drop(true)
            .output()
            .await?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr: String = stderr.trim().chars().take(MAX_STDERR_CHARS).collect();
            return Err(LocalError::Failed(format!(
                "{} exited with {}: {stderr}",
                self.name, result.status
            )));
        }

        let produced = match tokio::fs::try_exists(&output).await? {
            true => output,
            false => single_file_in(&outdir).await?.ok_or_else(|| {
                LocalError::Failed(format!("{} produced no output file", self.name))
            })?,
        };

        let bytes = tokio::fs::read(&produced).await?;
        let media_type = produced
            .extension()
            .and_then(|ext| ext.to_str())
            .map(media_type_for)
            .unwrap_or("application/octet-stream");
        let mut artifact = Artifact::new(bytes, media_type);
        if let Some(name) = produced.file_name().and_then(|n| n.to_str()) {
            artifact = artifact.with_file_name(name);
        }
        Ok(artifact)
    }
}

impl LocalConverter for CommandConverter {
    fn name(&self) -> &str {
        &self.name
    }

    fn convert<'a>(
        &'a self,
        request: &'a ConversionRequest,
    ) -> BoxFuture<'a, Result<Artifact, LocalError>> {
        Box::pin(self.run(request))
    }
}

fn expand(arg: &str, input: &Path, output: &Path, outdir: &Path) -> String {
    arg.replace("{input}", &input.to_string_lossy())
        .replace("{output}", &output.to_string_lossy())
        .replace("{outdir}", &outdir.to_string_lossy())
}

/// Keep the caller's file name so converters that derive output names from
/// it behave; otherwise `input.<ext>`. Only the last path component survives,
/// reduced to `[A-Za-z0-9._-]`.
fn input_file_name(input: &Artifact) -> String {
    input
        .file_name
        .as_deref()
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .map(sanitize_file_name)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("input.{}", extension_for(&input.media_type)))
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .take(MAX_FILE_NAME_LEN)
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => c,
            _ => '_',
        })
        .collect();
    cleaned.trim_start_matches(['.', '-']).to_string()
}

async fn single_file_in(dir: &Path) -> std::io::Result<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files.into_iter().next())
}

fn extension_for(media_type: &str) -> &'static str {
    let essence = media_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "application/pdf" => "pdf",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/msword" => "doc",
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "text/plain" => "txt",
        _ => "bin",
    }
}

fn media_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}
