//! 推理编排器：单 worker 线程 + 请求/响应两条队列
//!
//! 主循环只做非阻塞的 submit / poll；worker 线程持有自己的 current_thread tokio 运行时，
//! 严格按 FIFO 逐个处理请求（全局同时最多一个推理调用）。任何后端失败（包括 panic）
//! 都被转换为 `ResponseOutcome::Error`，worker 本身不会因此退出。
//!
//! stop 只阻止新请求开始，不打断进行中的调用；超时后直接返回，旧 worker 结束时交还请求队列，
//! 尚未处理的请求留在队列中，下次 start 继续处理。

use std::panic::AssertUnwindSafe;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use futures_util::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::core::{ErrorKind, OrchestratorError, ProviderError};
use crate::llm::{ChatOptions, ChunkStream, ProviderRegistry};
use crate::memory::Message;

/// 一次推理请求；history 是提交时的快照副本，worker 只读
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub id: Uuid,
    pub agent_id: String,
    pub provider: String,
    pub model: String,
    pub message: String,
    pub history: Vec<Message>,
    pub options: ChatOptions,
}

impl InferenceRequest {
    pub fn new(
        agent_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        message: impl Into<String>,
        history: Vec<Message>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            provider: provider.into(),
            model: model.into(),
            message: message.into(),
            history,
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// 发给后端的完整消息序列：历史快照 + 本轮用户消息
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(self.message.clone()));
        messages
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// truncated 表示触达流式上限被截断（仍算成功）
    Success { text: String, truncated: bool },
    Error { kind: ErrorKind, message: String },
}

/// worker 产出的响应，每个请求恰好一个
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResponse {
    pub request_id: Uuid,
    pub agent_id: String,
    pub outcome: ResponseOutcome,
}

impl InferenceResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ResponseOutcome::Success { .. })
    }

    /// "success" / "error"
    pub fn status(&self) -> &'static str {
        if self.is_success() {
            "success"
        } else {
            "error"
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.outcome {
            ResponseOutcome::Success { text, .. } => Some(text),
            ResponseOutcome::Error { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            ResponseOutcome::Error { kind, .. } => Some(*kind),
            ResponseOutcome::Success { .. } => None,
        }
    }
}

/// 流式读取上限：超过即截断，不视为错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLimits {
    pub max_chunks: usize,
    pub max_chars: usize,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_chunks: 4096,
            max_chars: 32_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// 空闲时等待队列的最长时间，之后重新检查停止信号
    pub poll_interval: Duration,
    pub limits: StreamLimits,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            limits: StreamLimits::default(),
        }
    }
}

type RequestRx = mpsc::UnboundedReceiver<InferenceRequest>;

/// 运行中的 worker
struct Worker {
    handle: JoinHandle<RequestRx>,
    cancel: CancellationToken,
    /// worker 退出时发送（或随线程结束断开）
    done_rx: std_mpsc::Receiver<()>,
}

/// 推理编排器
pub struct InferenceOrchestrator {
    registry: Arc<ProviderRegistry>,
    options: OrchestratorOptions,
    span: tracing::Span,
    request_tx: mpsc::UnboundedSender<InferenceRequest>,
    /// worker 未运行时由编排器保管
    request_rx: Option<RequestRx>,
    response_tx: mpsc::UnboundedSender<InferenceResponse>,
    response_rx: mpsc::UnboundedReceiver<InferenceResponse>,
    worker: Option<Worker>,
    /// stop 超时后仍在收尾的旧 worker
    lingering: Option<JoinHandle<RequestRx>>,
}

impl InferenceOrchestrator {
    pub fn new(registry: Arc<ProviderRegistry>, options: OrchestratorOptions) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        Self {
            registry,
            options,
            span: tracing::info_span!("orchestrator"),
            request_tx,
            request_rx: Some(request_rx),
            response_tx,
            response_rx,
            worker: None,
            lingering: None,
        }
    }

    /// 使用调用方提供的日志上下文
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// 启动唯一的 worker；已在运行时只记录警告
    pub fn start(&mut self) -> Result<(), OrchestratorError> {
        let span = self.span.clone();
        let _enter = span.enter();
        if self.worker.is_some() {
            tracing::warn!("Inference worker already running");
            return Ok(());
        }

        if let Some(handle) = self.lingering.take() {
            if !handle.is_finished() {
                self.lingering = Some(handle);
                return Err(OrchestratorError::WorkerStillRunning);
            }
            self.reclaim(handle);
        }

        let request_rx = match self.request_rx.take() {
            Some(rx) => rx,
            None => {
                tracing::warn!("Request queue was lost, creating a new one");
                let (tx, rx) = mpsc::unbounded_channel();
                self.request_tx = tx;
                rx
            }
        };

        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = std_mpsc::channel();
        let registry = Arc::clone(&self.registry);
        let response_tx = self.response_tx.clone();
        let options = self.options;
        let worker_cancel = cancel.clone();
        let worker_span = self.span.clone();

        let handle = std::thread::Builder::new()
            .name("llm-worker".to_string())
            .spawn(move || {
                let mut request_rx = request_rx;
                match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime.block_on(
                        run_worker(&mut request_rx, registry, response_tx, options, worker_cancel)
                            .instrument(worker_span),
                    ),
                    Err(e) => {
                        tracing::error!(parent: &worker_span, error = %e, "Failed to build worker runtime");
                    }
                }
                let _ = done_tx.send(());
                request_rx
            })?;

        tracing::info!("Inference worker started");
        self.worker = Some(Worker {
            handle,
            cancel,
            done_rx,
        });
        Ok(())
    }

    /// 通知 worker 退出并最多等待 timeout；按时退出返回 true
    pub fn stop(&mut self, timeout: Duration) -> bool {
        let span = self.span.clone();
        let _enter = span.enter();
        let Some(worker) = self.worker.take() else {
            return true;
        };

        let started = Instant::now();
        worker.cancel.cancel();
        match worker.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                self.reclaim(worker.handle);
                tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Inference worker stopped");
                true
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_secs = timeout.as_secs_f64(),
                    "Inference worker did not stop in time, continuing shutdown"
                );
                self.lingering = Some(worker.handle);
                false
            }
        }
    }

    /// 入队，从不阻塞；worker 未运行时请求留在队列中
    pub fn submit(&self, request: InferenceRequest) -> Result<(), OrchestratorError> {
        tracing::debug!(
            parent: &self.span,
            request_id = %request.id,
            agent_id = %request.agent_id,
            provider = %request.provider,
            "Request queued"
        );
        self.request_tx
            .send(request)
            .map_err(|_| OrchestratorError::QueueClosed)
    }

    /// 取一个已完成的响应；没有则返回 None
    pub fn poll(&mut self) -> Option<InferenceResponse> {
        self.response_rx.try_recv().ok()
    }

    /// 回收已退出 worker 交还的请求队列
    fn reclaim(&mut self, handle: JoinHandle<RequestRx>) {
        match handle.join() {
            Ok(rx) => self.request_rx = Some(rx),
            Err(_) => {
                tracing::error!("Inference worker panicked, pending requests were dropped");
                self.request_rx = None;
            }
        }
    }
}

impl Drop for InferenceOrchestrator {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.cancel.cancel();
        }
    }
}

async fn run_worker(
    request_rx: &mut RequestRx,
    registry: Arc<ProviderRegistry>,
    response_tx: mpsc::UnboundedSender<InferenceResponse>,
    options: OrchestratorOptions,
    cancel: CancellationToken,
) {
    tracing::debug!("Inference worker loop entered");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = tokio::time::timeout(options.poll_interval, request_rx.recv()) => {
                let request = match next {
                    Err(_) => continue,
                    Ok(None) => {
                        tracing::debug!("Request queue closed");
                        break;
                    }
                    Ok(Some(request)) => request,
                };
                let response = process_guarded(&registry, request, options.limits).await;
                if response_tx.send(response).is_err() {
                    tracing::warn!("Response queue closed, worker exiting");
                    break;
                }
            }
        }
    }
    tracing::debug!("Inference worker loop exited");
}

/// 处理单个请求；后端 panic 也转为错误响应
async fn process_guarded(
    registry: &ProviderRegistry,
    request: InferenceRequest,
    limits: StreamLimits,
) -> InferenceResponse {
    let request_id = request.id;
    let agent_id = request.agent_id.clone();
    let span = tracing::info_span!("inference", %request_id, agent_id = %agent_id, provider = %request.provider);

    let outcome = match AssertUnwindSafe(process_request(registry, &request, limits))
        .catch_unwind()
        .instrument(span.clone())
        .await
    {
        Ok(Ok(collected)) => ResponseOutcome::Success {
            text: collected.text,
            truncated: collected.truncated,
        },
        Ok(Err(e)) => {
            tracing::error!(parent: &span, error = %e, kind = %e.kind(), "Inference failed");
            ResponseOutcome::Error {
                kind: e.kind(),
                message: e.to_string(),
            }
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(parent: &span, panic = %detail, "Provider panicked during inference");
            ResponseOutcome::Error {
                kind: ErrorKind::Other,
                message: format!("Provider failure: {detail}"),
            }
        }
    };

    InferenceResponse {
        request_id,
        agent_id,
        outcome,
    }
}

async fn process_request(
    registry: &ProviderRegistry,
    request: &InferenceRequest,
    limits: StreamLimits,
) -> Result<Collected, ProviderError> {
    let started = Instant::now();
    let provider = match registry.get(&request.provider) {
        Some(provider) => provider,
        None if registry.is_uninitialized(&request.provider) => {
            return Err(ProviderError::Unreachable(format!(
                "{} is not initialized",
                request.provider
            )));
        }
        None => return Err(ProviderError::UnknownProvider(request.provider.clone())),
    };

    if !provider.is_available().await {
        return Err(ProviderError::Unreachable(format!(
            "{} is not available",
            provider.name()
        )));
    }

    let stream = provider
        .send_message(&request.messages(), &request.model, &request.options)
        .await?;
    let collected = collect_stream(stream, limits).await?;

    if collected.text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    if collected.truncated {
        tracing::warn!(
            chunks = collected.chunks,
            chars = collected.text.chars().count(),
            "Response truncated at stream limit"
        );
    }
    tracing::info!(
        chunks = collected.chunks,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Inference completed"
    );
    Ok(collected)
}

#[derive(Debug, Default, PartialEq)]
struct Collected {
    text: String,
    chunks: usize,
    truncated: bool,
}

/// 拼接全部片段；触达上限即停止读取，流在返回前被丢弃（关闭底层连接）
async fn collect_stream(
    mut stream: ChunkStream,
    limits: StreamLimits,
) -> Result<Collected, ProviderError> {
    let mut collected = Collected::default();
    let mut chars = 0usize;

    while let Some(item) = stream.next().await {
        let chunk = item?;
        if collected.chunks >= limits.max_chunks {
            collected.truncated = true;
            break;
        }
        collected.chunks += 1;

        let len = chunk.chars().count();
        let remaining = limits.max_chars.saturating_sub(chars);
        if len > remaining {
            collected.text.extend(chunk.chars().take(remaining));
            collected.truncated = true;
            break;
        }
        collected.text.push_str(&chunk);
        chars += len;
    }
    drop(stream);
    Ok(collected)
}
