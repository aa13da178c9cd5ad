//! Renders a [`MixPlan`] through an external mixer, either in one pass or as
//! independently mixed chunks merged at the end.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    config::LimiterConfig, ClickTrackError, GeneratorConfig, InvocationError, MixPlan, RenderConfig,
    Result,
};

/// How a plan is turned into audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderStrategy {
    /// Every placement is an input of a single mixer run.
    Direct,
    /// Placements are mixed in groups, then the groups are merged.
    Chunked,
}

impl fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Chunked => f.write_str("chunked"),
        }
    }
}

/// Bounds applied to every mixer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvocationLimits {
    pub timeout: Duration,
    /// Per-stream cap on captured stdout and stderr.
    pub max_output_bytes: usize,
}

impl From<&RenderConfig> for InvocationLimits {
    fn from(config: &RenderConfig) -> Self {
        Self {
            timeout: config.timeout(),
            max_output_bytes: config.max_output_bytes,
        }
    }
}

/// One declarative mixer run: inputs, filter graph, trim and destination.
#[derive(Debug, Clone, PartialEq)]
pub struct MixRequest {
    pub inputs: Vec<PathBuf>,
    pub filter_graph: String,
    pub duration_seconds: f64,
    pub output: PathBuf,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

impl MixRequest {
    /// Command line arguments for an ffmpeg-compatible mixer.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-y".into()];
        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.clone().into_os_string());
        }
        args.push("-filter_complex".into());
        args.push(self.filter_graph.clone().into());
        args.push("-map".into());
        args.push("[out]".into());
        args.push("-t".into());
        args.push(self.duration_seconds.to_string().into());
        if let Some(rate) = self.sample_rate {
            args.push("-ar".into());
            args.push(rate.to_string().into());
        }
        if let Some(channels) = self.channels {
            args.push("-ac".into());
            args.push(channels.to_string().into());
        }
        args.push(self.output.clone().into_os_string());
        args
    }
}

/// Captured output of a successful mixer run.
#[derive(Debug, Clone, Default)]
pub struct InvocationOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Runs the external mixer. Implementations must honour `limits`.
#[async_trait]
pub trait MixInvoker: Send + Sync {
    async fn invoke(
        &self,
        request: &MixRequest,
        limits: &InvocationLimits,
    ) -> std::result::Result<InvocationOutput, InvocationError>;
}

/// [`MixInvoker`] that spawns an ffmpeg process.
#[derive(Debug, Clone)]
pub struct FfmpegInvoker {
    binary: PathBuf,
}

impl FfmpegInvoker {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Default for FfmpegInvoker {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl MixInvoker for FfmpegInvoker {
    async fn invoke(
        &self,
        request: &MixRequest,
        limits: &InvocationLimits,
    ) -> std::result::Result<InvocationOutput, InvocationError> {
        tracing::debug!(
            binary = %self.binary.display(),
            inputs = request.inputs.len(),
            output = %request.output.display(),
            "invoking mixer"
        );

        let mut child = tokio::process::Command::new(&self.binary)
            .args(request.to_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| InvocationError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = limits.max_output_bytes;

        let run = async {
            let (stdout, stderr) =
                tokio::try_join!(read_capped(stdout, limit), read_capped(stderr, limit))?;
            let status = child.wait().await.map_err(InvocationError::Wait)?;
            Ok::<_, InvocationError>((status, stdout, stderr))
        };

        // Dropping the child on timeout or overflow kills the process.
        let (status, stdout, stderr) = tokio::time::timeout(limits.timeout, run)
            .await
            .map_err(|_| InvocationError::TimedOut(limits.timeout))??;

        if !status.success() {
            return Err(InvocationError::NonZeroExit {
                status: status.to_string(),
                stderr: stderr_tail(&stderr),
            });
        }

        Ok(InvocationOutput { stdout, stderr })
    }
}

async fn read_capped<R>(
    reader: Option<R>,
    limit: usize,
) -> std::result::Result<Vec<u8>, InvocationError>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = Vec::new();
    if let Some(reader) = reader {
        reader
            .take((limit as u64).saturating_add(1))
            .read_to_end(&mut buffer)
            .await
            .map_err(InvocationError::Wait)?;
    }

    if buffer.len() > limit {
        return Err(InvocationError::OutputOverflow {
            limit,
            produced: buffer.len(),
        });
    }
    Ok(buffer)
}

fn stderr_tail(stderr: &[u8]) -> String {
    const TAIL: usize = 2048;
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().rev().nth(TAIL) {
        Some((start, _)) => format!("...{}", &text[start..]),
        None => text.to_string(),
    }
}

/// Filter graph that delays input `i` by `offsets_ms[i]` and mixes all inputs
/// at `1/sqrt(n)` gain, optionally followed by the peak limiter.
pub fn mix_filter_graph(offsets_ms: &[u64], limiter: Option<&LimiterConfig>) -> String {
    let mut filters: Vec<String> = offsets_ms
        .iter()
        .enumerate()
        .map(|(index, delay)| format!("[{index}:a]adelay={delay}|{delay}[a{index}]"))
        .collect();

    let labels: String = (0..offsets_ms.len()).map(|index| format!("[a{index}]")).collect();
    filters.push(format!("{labels}{}", mix_tail(offsets_ms.len(), limiter)));
    filters.join(";")
}

/// Filter graph that mixes already rendered chunk files and limits the sum.
pub fn merge_filter_graph(inputs: usize, limiter: &LimiterConfig) -> String {
    let labels: String = (0..inputs).map(|index| format!("[{index}:a]")).collect();
    format!("{labels}{}", mix_tail(inputs, Some(limiter)))
}

fn mix_tail(inputs: usize, limiter: Option<&LimiterConfig>) -> String {
    let volume = 1.0 / (inputs as f64).sqrt();
    let mut tail = format!(
        "amix=inputs={inputs}:duration=longest:dropout_transition=0:normalize=0,volume={volume}"
    );
    if let Some(limiter) = limiter {
        tail.push_str(&format!(
            ",alimiter=limit={}:attack={}:release={}",
            limiter.limit, limiter.attack_ms, limiter.release_ms
        ));
    }
    tail.push_str("[out]");
    tail
}

/// Outcome of a successful render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderReport {
    /// Strategy that produced the output.
    pub strategy: RenderStrategy,
    /// The direct strategy failed and the chunked strategy took over.
    pub fell_back: bool,
    pub chunks_rendered: usize,
    pub chunks_omitted: usize,
    pub output: PathBuf,
}

/// Chooses a strategy for a plan and drives the mixer.
#[derive(Debug)]
pub struct RenderPipeline<I> {
    invoker: I,
    direct_limit: usize,
    chunk_size: usize,
    config: RenderConfig,
}

impl<I: MixInvoker> RenderPipeline<I> {
    pub fn new(invoker: I, config: &GeneratorConfig) -> Self {
        Self {
            invoker,
            direct_limit: config.direct_limit,
            chunk_size: config.chunk_size.max(1),
            config: config.render.clone(),
        }
    }

    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    pub fn strategy_for(&self, plan: &MixPlan) -> RenderStrategy {
        if plan.len() <= self.direct_limit {
            RenderStrategy::Direct
        } else {
            RenderStrategy::Chunked
        }
    }

    /// Renders `plan` into `output`. `on_strategy` is told about every
    /// strategy that is attempted, in order.
    pub async fn render(
        &self,
        plan: &MixPlan,
        output: &Path,
        mut on_strategy: impl FnMut(RenderStrategy),
    ) -> Result<RenderReport> {
        if plan.is_empty() {
            return Err(ClickTrackError::EmptyLibrary(
                "no sounds could be placed for this timeline".to_string(),
            ));
        }

        if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let strategy = self.strategy_for(plan);
        on_strategy(strategy);

        if strategy == RenderStrategy::Chunked {
            return self.render_chunked(plan, output, false).await;
        }

        match self.render_direct(plan, output).await {
            Ok(()) => {
                tracing::info!(output = %output.display(), "audio generated");
                Ok(RenderReport {
                    strategy: RenderStrategy::Direct,
                    fell_back: false,
                    chunks_rendered: 0,
                    chunks_omitted: 0,
                    output: output.to_path_buf(),
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "direct generation failed, falling back to chunked method");
                on_strategy(RenderStrategy::Chunked);
                self.render_chunked(plan, output, true).await
            }
        }
    }

    async fn render_direct(
        &self,
        plan: &MixPlan,
        output: &Path,
    ) -> std::result::Result<(), InvocationError> {
        tracing::info!(placements = plan.len(), "generating audio (direct method)");

        let request = MixRequest {
            inputs: plan.placements().iter().map(|p| p.sound.clone()).collect(),
            filter_graph: mix_filter_graph(&offsets(plan.placements()), Some(&self.config.limiter)),
            duration_seconds: plan.duration_seconds(),
            output: output.to_path_buf(),
            sample_rate: None,
            channels: None,
        };

        self.invoker
            .invoke(&request, &InvocationLimits::from(&self.config))
            .await
            .map(|_| ())
    }

    async fn render_chunked(
        &self,
        plan: &MixPlan,
        output: &Path,
        fell_back: bool,
    ) -> Result<RenderReport> {
        let root = self.config.temp_root();
        std::fs::create_dir_all(&root)?;
        let workspace = tempfile::Builder::new()
            .prefix("clicktrack-")
            .tempdir_in(&root)?;

        let result = self.render_chunks(plan, workspace.path(), output, fell_back).await;

        tracing::debug!(dir = %workspace.path().display(), "cleaning up temporary files");
        if let Err(err) = workspace.close() {
            tracing::debug!(error = %err, "could not remove temp dir");
        }
        result
    }

    async fn render_chunks(
        &self,
        plan: &MixPlan,
        workspace: &Path,
        output: &Path,
        fell_back: bool,
    ) -> Result<RenderReport> {
        let limits = InvocationLimits::from(&self.config);
        let chunks: Vec<_> = plan.placements().chunks(self.chunk_size).collect();

        tracing::info!(
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            dir = %workspace.display(),
            "generating audio (chunked method)"
        );

        let mut rendered = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let chunk_output = workspace.join(format!("chunk_{index}.wav"));
            let request = MixRequest {
                inputs: chunk.iter().map(|p| p.sound.clone()).collect(),
                filter_graph: mix_filter_graph(&offsets(chunk), None),
                duration_seconds: plan.duration_seconds(),
                output: chunk_output.clone(),
                sample_rate: Some(self.config.chunk_sample_rate),
                channels: Some(self.config.chunk_channels),
            };

            match self.invoker.invoke(&request, &limits).await {
                Ok(_) => {
                    tracing::info!(chunk = index + 1, total = chunks.len(), "chunk complete");
                    rendered.push(chunk_output);
                }
                Err(err) => {
                    tracing::warn!(chunk = index + 1, error = %err, "chunk failed, omitting it from the merge");
                }
            }
        }

        let omitted = chunks.len() - rendered.len();
        if rendered.is_empty() {
            remove_partial_output(output);
            return Err(ClickTrackError::MergeFailure(format!(
                "all {} chunks failed to render",
                chunks.len()
            )));
        }

        tracing::info!(inputs = rendered.len(), "merging chunks");
        let merge = MixRequest {
            filter_graph: merge_filter_graph(rendered.len(), &self.config.limiter),
            inputs: rendered,
            duration_seconds: plan.duration_seconds(),
            output: output.to_path_buf(),
            sample_rate: None,
            channels: None,
        };

        if let Err(err) = self.invoker.invoke(&merge, &limits).await {
            remove_partial_output(output);
            return Err(ClickTrackError::MergeFailure(err.to_string()));
        }

        tracing::info!(output = %output.display(), "audio generated");
        Ok(RenderReport {
            strategy: RenderStrategy::Chunked,
            fell_back,
            chunks_rendered: merge.inputs.len(),
            chunks_omitted: omitted,
            output: output.to_path_buf(),
        })
    }
}

fn offsets(placements: &[crate::MixPlacement]) -> Vec<u64> {
    placements.iter().map(|p| p.offset_ms).collect()
}

fn remove_partial_output(output: &Path) {
    if output.exists() {
        if let Err(err) = std::fs::remove_file(output) {
            tracing::debug!(output = %output.display(), error = %err, "could not remove partial output");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::MixPlacement;

    type FailWhen = Box<dyn Fn(&MixRequest) -> bool + Send + Sync>;

    /// Records requests and writes a stub output unless told to fail.
    pub(crate) struct FakeInvoker {
        pub(crate) requests: Mutex<Vec<MixRequest>>,
        fail_when: FailWhen,
    }

    impl FakeInvoker {
        pub(crate) fn succeeding() -> Self {
            Self::failing_when(|_| false)
        }

        pub(crate) fn failing_when(fail_when: impl Fn(&MixRequest) -> bool + Send + Sync + 'static) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail_when: Box::new(fail_when),
            }
        }

        pub(crate) fn requests(&self) -> Vec<MixRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MixInvoker for FakeInvoker {
        async fn invoke(
            &self,
            request: &MixRequest,
            _limits: &InvocationLimits,
        ) -> std::result::Result<InvocationOutput, InvocationError> {
            self.requests.lock().unwrap().push(request.clone());
            if (self.fail_when)(request) {
                // a failed run may still leave a partial file behind
                std::fs::write(&request.output, b"partial").unwrap();
                return Err(InvocationError::NonZeroExit {
                    status: "exit status: 1".to_string(),
                    stderr: "simulated failure".to_string(),
                });
            }
            std::fs::write(&request.output, b"audio").unwrap();
            Ok(InvocationOutput::default())
        }
    }

    pub(crate) fn is_chunk(request: &MixRequest) -> bool {
        request.sample_rate.is_some()
    }

    pub(crate) fn is_direct_or_merge(request: &MixRequest) -> bool {
        request.sample_rate.is_none()
    }

    fn plan(count: usize) -> MixPlan {
        let placements = (0..count)
            .map(|index| MixPlacement {
                sound: PathBuf::from(format!("click{}.mp3", index % 3)),
                offset_ms: index as u64 * 10,
            })
            .collect();
        MixPlan::new(placements, count as f64 / 100.0 + 2.0)
    }

    fn config(temp_root: &Path) -> GeneratorConfig {
        let mut config = GeneratorConfig::default();
        config.render.temp_root = Some(temp_root.to_path_buf());
        config
    }

    fn temp_entries(root: &Path) -> usize {
        std::fs::read_dir(root).unwrap().count()
    }

    #[test]
    fn direct_graph_delays_mixes_and_limits() {
        let graph = mix_filter_graph(&[0, 250, 1000, 1500], Some(&LimiterConfig::default()));

        assert_eq!(
            graph,
            "[0:a]adelay=0|0[a0];[1:a]adelay=250|250[a1];[2:a]adelay=1000|1000[a2];\
             [3:a]adelay=1500|1500[a3];[a0][a1][a2][a3]amix=inputs=4:duration=longest:\
             dropout_transition=0:normalize=0,volume=0.5,alimiter=limit=0.95:attack=1:release=50[out]"
        );
    }

    #[test]
    fn chunk_graph_has_no_limiter() {
        let graph = mix_filter_graph(&[5], None);
        assert_eq!(
            graph,
            "[0:a]adelay=5|5[a0];[a0]amix=inputs=1:duration=longest:dropout_transition=0:normalize=0,volume=1[out]"
        );
    }

    #[test]
    fn merge_graph_mixes_chunk_files() {
        let graph = merge_filter_graph(4, &LimiterConfig::default());
        assert!(graph.starts_with("[0:a][1:a][2:a][3:a]amix=inputs=4:"));
        assert!(graph.contains("volume=0.5,alimiter=limit=0.95"));
    }

    #[test]
    fn request_arguments_follow_mixer_layout() {
        let request = MixRequest {
            inputs: vec![PathBuf::from("a.mp3"), PathBuf::from("b.mp3")],
            filter_graph: "graph".to_string(),
            duration_seconds: 3.5,
            output: PathBuf::from("chunk_0.wav"),
            sample_rate: Some(48_000),
            channels: Some(2),
        };

        let args: Vec<String> = request
            .to_args()
            .into_iter()
            .map(|arg| arg.into_string().unwrap())
            .collect();
        assert_eq!(
            args,
            vec![
                "-y", "-i", "a.mp3", "-i", "b.mp3", "-filter_complex", "graph", "-map", "[out]",
                "-t", "3.5", "-ar", "48000", "-ac", "2", "chunk_0.wav"
            ]
        );
    }

    #[test]
    fn strategy_switches_above_five_hundred() {
        let pipeline = RenderPipeline::new(FakeInvoker::succeeding(), &GeneratorConfig::default());

        assert_eq!(pipeline.strategy_for(&plan(500)), RenderStrategy::Direct);
        assert_eq!(pipeline.strategy_for(&plan(501)), RenderStrategy::Chunked);
    }

    #[tokio::test]
    async fn direct_render_uses_one_invocation() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("out").join("track.mp3");
        let pipeline = RenderPipeline::new(FakeInvoker::succeeding(), &config(temp.path()));

        let mut seen = Vec::new();
        let report = pipeline.render(&plan(3), &output, |s| seen.push(s)).await.unwrap();

        assert_eq!(report.strategy, RenderStrategy::Direct);
        assert!(!report.fell_back);
        assert_eq!(seen, vec![RenderStrategy::Direct]);
        let requests = pipeline.invoker().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].inputs.len(), 3);
        assert!((requests[0].duration_seconds - 2.03).abs() < 1e-9);
        assert!(output.exists());
    }

    #[tokio::test]
    async fn chunked_render_splits_into_groups_of_fifty() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("track.mp3");
        let mut config = config(temp.path());
        config.direct_limit = 100;
        let pipeline = RenderPipeline::new(FakeInvoker::succeeding(), &config);

        let report = pipeline.render(&plan(120), &output, |_| {}).await.unwrap();

        let requests = pipeline.invoker().requests();
        let chunk_sizes: Vec<usize> = requests
            .iter()
            .filter(|r| is_chunk(r))
            .map(|r| r.inputs.len())
            .collect();
        assert_eq!(chunk_sizes, vec![50, 50, 20]);
        assert_eq!(requests.len(), 4);

        let merge = requests.last().unwrap();
        assert_eq!(merge.inputs.len(), 3);
        assert_eq!(merge.output, output);
        assert!(merge.filter_graph.contains("alimiter"));
        assert!(!requests[0].filter_graph.contains("alimiter"));
        // offsets stay absolute inside later chunks
        assert!(requests[1].filter_graph.starts_with("[0:a]adelay=500|500[a0]"));

        assert_eq!(report.chunks_rendered, 3);
        assert_eq!(report.chunks_omitted, 0);
        assert_eq!(temp_entries(temp.path()), 1, "only the output should remain");
    }

    #[tokio::test]
    async fn failed_direct_render_falls_back_to_chunks() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("track.mp3");
        let invoker = FakeInvoker::failing_when(|r| is_direct_or_merge(r) && r.inputs.len() == 60);
        let pipeline = RenderPipeline::new(invoker, &config(temp.path()));

        let mut seen = Vec::new();
        let report = pipeline.render(&plan(60), &output, |s| seen.push(s)).await.unwrap();

        assert_eq!(seen, vec![RenderStrategy::Direct, RenderStrategy::Chunked]);
        assert_eq!(report.strategy, RenderStrategy::Chunked);
        assert!(report.fell_back);
        assert_eq!(report.chunks_rendered, 2);
        assert_eq!(std::fs::read(&output).unwrap(), b"audio");
        assert_eq!(temp_entries(temp.path()), 1);
    }

    #[tokio::test]
    async fn failed_chunk_is_left_out_of_merge() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("track.mp3");
        let invoker = FakeInvoker::failing_when(|r| {
            is_chunk(r) && r.output.file_name().unwrap() == "chunk_1.wav"
        });
        let mut config = config(temp.path());
        config.direct_limit = 10;
        let pipeline = RenderPipeline::new(invoker, &config);

        let report = pipeline.render(&plan(120), &output, |_| {}).await.unwrap();

        assert_eq!(report.chunks_rendered, 2);
        assert_eq!(report.chunks_omitted, 1);
        let merge = pipeline.invoker().requests().pop().unwrap();
        let names: Vec<_> = merge
            .inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["chunk_0.wav", "chunk_2.wav"]);
        assert_eq!(temp_entries(temp.path()), 1);
    }

    #[tokio::test]
    async fn merge_failure_is_fatal_and_cleans_up() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("track.mp3");
        let pipeline = RenderPipeline::new(
            FakeInvoker::failing_when(|r| is_direct_or_merge(r)),
            &config(temp.path()),
        );

        let err = pipeline.render(&plan(20), &output, |_| {}).await.unwrap_err();

        assert!(matches!(err, ClickTrackError::MergeFailure(_)));
        assert!(!output.exists());
        assert_eq!(temp_entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn all_chunks_failing_is_a_merge_failure() {
        let temp = tempfile::tempdir().unwrap();
        let output = temp.path().join("track.mp3");
        let pipeline = RenderPipeline::new(FakeInvoker::failing_when(|_| true), &config(temp.path()));

        let err = pipeline.render(&plan(5), &output, |_| {}).await.unwrap_err();

        assert!(matches!(err, ClickTrackError::MergeFailure(_)));
        // direct attempt plus one chunk, no merge
        assert_eq!(pipeline.invoker().requests().len(), 2);
        assert_eq!(temp_entries(temp.path()), 0);
    }

    #[tokio::test]
    async fn empty_plan_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let pipeline = RenderPipeline::new(FakeInvoker::succeeding(), &config(temp.path()));

        let err = pipeline
            .render(&MixPlan::new(Vec::new(), 2.0), &temp.path().join("x.mp3"), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, ClickTrackError::EmptyLibrary(_)));
        assert!(pipeline.invoker().requests().is_empty());
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn request(dir: &Path) -> MixRequest {
            MixRequest {
                inputs: vec![dir.join("in.mp3")],
                filter_graph: "graph".to_string(),
                duration_seconds: 1.0,
                output: dir.join("out.mp3"),
                sample_rate: None,
                channels: None,
            }
        }

        fn limits(max_output_bytes: usize) -> InvocationLimits {
            InvocationLimits {
                timeout: Duration::from_secs(10),
                max_output_bytes,
            }
        }

        #[tokio::test]
        async fn zero_exit_is_success() {
            let dir = tempfile::tempdir().unwrap();
            let result = FfmpegInvoker::new("true").invoke(&request(dir.path()), &limits(1024)).await;
            assert!(result.is_ok());
        }

        #[tokio::test]
        async fn non_zero_exit_is_failure() {
            let dir = tempfile::tempdir().unwrap();
            let err = FfmpegInvoker::new("false")
                .invoke(&request(dir.path()), &limits(1024))
                .await
                .unwrap_err();
            assert!(matches!(err, InvocationError::NonZeroExit { .. }));
        }

        #[tokio::test]
        async fn missing_binary_is_a_spawn_failure() {
            let dir = tempfile::tempdir().unwrap();
            let err = FfmpegInvoker::new("/no/such/ffmpeg")
                .invoke(&request(dir.path()), &limits(1024))
                .await
                .unwrap_err();
            assert!(matches!(err, InvocationError::Spawn { .. }));
        }

        /// Writes an executable shell script standing in for the mixer.
        fn fake_mixer(dir: &Path, body: &str) -> PathBuf {
            use std::os::unix::fs::PermissionsExt;

            let path = dir.join("fake-ffmpeg");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn endless_output_overflows() {
            let dir = tempfile::tempdir().unwrap();
            let mixer = fake_mixer(dir.path(), "while :; do echo frame=1 size=0kB; done");

            let err = FfmpegInvoker::new(mixer)
                .invoke(&request(dir.path()), &limits(4096))
                .await
                .unwrap_err();
            assert!(
                matches!(err, InvocationError::OutputOverflow { limit: 4096, produced: 4097 }),
                "got {err:?}"
            );
        }

        #[tokio::test]
        async fn hung_mixer_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let mixer = fake_mixer(dir.path(), "exec sleep 30");
            let limits = InvocationLimits {
                timeout: Duration::from_millis(100),
                max_output_bytes: 1024,
            };

            let started = std::time::Instant::now();
            let err = FfmpegInvoker::new(mixer)
                .invoke(&request(dir.path()), &limits)
                .await
                .unwrap_err();

            assert!(matches!(err, InvocationError::TimedOut(t) if t == Duration::from_millis(100)), "got {err:?}");
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
