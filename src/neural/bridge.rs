//! DeepFilterNet bridge
//!
//! Drives the DeepFilterNet model living in a Python process. The process
//! is started once and kept alive; each window is exchanged as a pair of
//! scratch WAV files plus one JSON request/response line over stdin/stdout.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::model::{Enhancer, EnhancerInfo};
use crate::config::BridgeConfig;
use crate::engine::buffer::AudioBuffer;
use crate::engine::io::{export_audio, import_audio, ExportEncoding};
use crate::error::{DuetError, Result};

/// Rate DeepFilterNet 3 operates at
pub const DEEPFILTER_SAMPLE_RATE: u32 = 48000;

/// Request to the Python bridge
#[derive(Debug, Serialize)]
struct BridgeRequest {
    action: &'static str,
    request_id: String,
    input_path: String,
    output_path: String,
    atten_lim_db: f32,
}

/// Response from the Python bridge
#[derive(Debug, Deserialize)]
struct BridgeResponse {
    success: bool,
    #[serde(default)]
    request_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    processing_time_ms: Option<u64>,
}

/// Running bridge process with its pipes
struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Drop for BridgeProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// DeepFilterNet enhancer backed by a Python bridge process
pub struct DeepFilterBridge {
    info: EnhancerInfo,
    process: Mutex<Option<BridgeProcess>>,
    python_path: String,
    bridge_module: String,
}

impl DeepFilterBridge {
    pub fn new(python_path: impl Into<String>, bridge_module: impl Into<String>) -> Self {
        Self {
            info: EnhancerInfo {
                id: "deepfilter".to_string(),
                name: "DeepFilterNet".to_string(),
                version: "3".to_string(),
                sample_rate: Some(DEEPFILTER_SAMPLE_RATE),
                stateful: true,
            },
            process: Mutex::new(None),
            python_path: python_path.into(),
            bridge_module: bridge_module.into(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.python.clone(), config.module.clone())
    }

    fn spawn(&self) -> Result<BridgeProcess> {
        let mut child = Command::new(&self.python_path)
            .args(["-m", &self.bridge_module])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DuetError::Enhancer {
                reason: format!("Failed to start Python bridge: {}", e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| DuetError::Enhancer {
            reason: "Bridge stdin not available".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| DuetError::Enhancer {
            reason: "Bridge stdout not available".to_string(),
        })?;

        info!(python = %self.python_path, module = %self.bridge_module, "model bridge started");

        Ok(BridgeProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }

    /// Send one request and wait for its response line
    ///
    /// Any pipe failure tears the process down so the next call respawns it.
    fn send_request(&self, request: &BridgeRequest) -> Result<BridgeResponse> {
        let mut guard = self.process.lock().map_err(|_| DuetError::Enhancer {
            reason: "Failed to acquire bridge lock".to_string(),
        })?;

        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }

        let result = match guard.as_mut() {
            Some(process) => exchange(process, request),
            None => Err(DuetError::Enhancer {
                reason: "Bridge process not running".to_string(),
            }),
        };

        if result.is_err() {
            warn!("model bridge failed, it will be restarted on next use");
            *guard = None;
        }

        result
    }

    /// Ask the bridge whether the model loaded
    pub fn check_availability(&self) -> Result<bool> {
        let request = BridgeRequest {
            action: "ping",
            request_id: uuid::Uuid::new_v4().to_string(),
            input_path: String::new(),
            output_path: String::new(),
            atten_lim_db: 0.0,
        };

        Ok(self.send_request(&request)?.success)
    }
}

fn exchange(process: &mut BridgeProcess, request: &BridgeRequest) -> Result<BridgeResponse> {
    let line = serde_json::to_string(request)?;
    writeln!(process.stdin, "{}", line).map_err(|e| DuetError::Enhancer {
        reason: format!("Failed to write to bridge: {}", e),
    })?;
    process.stdin.flush().map_err(|e| DuetError::Enhancer {
        reason: format!("Failed to flush bridge stdin: {}", e),
    })?;

    let mut response_line = String::new();
    let read = process
        .stdout
        .read_line(&mut response_line)
        .map_err(|e| DuetError::Enhancer {
            reason: format!("Failed to read from bridge: {}", e),
        })?;
    if read == 0 {
        return Err(DuetError::Enhancer {
            reason: "Bridge closed its output".to_string(),
        });
    }

    let response: BridgeResponse =
        serde_json::from_str(&response_line).map_err(|e| DuetError::Enhancer {
            reason: format!("Failed to parse bridge response: {}", e),
        })?;

    if response.request_id.as_deref().is_some_and(|id| id != request.request_id) {
        return Err(DuetError::Enhancer {
            reason: "Bridge answered a different request".to_string(),
        });
    }

    Ok(response)
}

impl Enhancer for DeepFilterBridge {
    fn info(&self) -> &EnhancerInfo {
        &self.info
    }

    fn enhance(&self, window: &AudioBuffer, attenuation_limit_db: f32) -> Result<AudioBuffer> {
        let start = Instant::now();
        let scratch = tempfile::Builder::new().prefix("duet-window").tempdir()?;
        let input_path = scratch.path().join("in.wav");
        let output_path = scratch.path().join("out.wav");

        export_audio(window, &input_path, ExportEncoding::Float32)?;

        let request = BridgeRequest {
            action: "enhance",
            request_id: uuid::Uuid::new_v4().to_string(),
            input_path: input_path.to_string_lossy().into_owned(),
            output_path: output_path.to_string_lossy().into_owned(),
            atten_lim_db: attenuation_limit_db,
        };

        let response = self.send_request(&request)?;
        if !response.success {
            return Err(DuetError::Enhancer {
                reason: response.error.unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        let enhanced = import_audio(&output_path, Some(window.sample_rate()))?;
        debug!(
            frames = window.frame_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            model_ms = response.processing_time_ms,
            "window enhanced by bridge"
        );

        Ok(enhanced)
    }

    fn is_available(&self) -> bool {
        self.check_availability().unwrap_or(false)
    }
}
