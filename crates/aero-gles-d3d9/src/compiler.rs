//! Process-scoped HLSL compiler module.
//!
//! The compiler library is loaded at most once per process and shared by every back-end instance.
//! It is an external collaborator: this crate only selects profiles and flag sets and collects
//! diagnostics.

use std::sync::{Arc, Mutex, MutexGuard};

use bitflags::bitflags;
use tracing::{debug, info, warn};

use crate::caps::ShaderModel;
use crate::error::BackendError;

bitflags! {
    /// `D3DCOMPILE_*` flags passed through to the compiler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CompileFlags: u32 {
        const SKIP_OPTIMIZATION = 1 << 2;
        const AVOID_FLOW_CONTROL = 1 << 9;
        const PREFER_FLOW_CONTROL = 1 << 10;
        const OPTIMIZATION_LEVEL3 = 1 << 15;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProfile {
    pub stage: ShaderStage,
    pub model: ShaderModel,
}

impl ShaderProfile {
    pub fn new(stage: ShaderStage, model: ShaderModel) -> Self {
        Self { stage, model }
    }

    pub fn as_str(self) -> &'static str {
        match (self.stage, self.model) {
            (ShaderStage::Vertex, ShaderModel::Sm2) => "vs_2_0",
            (ShaderStage::Vertex, ShaderModel::Sm3) => "vs_3_0",
            (ShaderStage::Pixel, ShaderModel::Sm2) => "ps_2_0",
            (ShaderStage::Pixel, ShaderModel::Sm3) => "ps_3_0",
        }
    }
}

/// `compile(source) -> bytecode | diagnostics`.
pub trait ShaderCompiler: Send + Sync {
    fn compile(
        &self,
        source: &str,
        profile: ShaderProfile,
        flags: CompileFlags,
    ) -> Result<Vec<u8>, String>;
}

static COMPILER: Mutex<Option<Arc<dyn ShaderCompiler>>> = Mutex::new(None);

fn slot() -> MutexGuard<'static, Option<Arc<dyn ShaderCompiler>>> {
    // The slot only ever holds a fully constructed value, so a poisoned lock is still consistent.
    COMPILER.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Load the compiler module on first use. Later calls return the loaded module without running
/// `loader` again.
pub fn load_compiler<F>(loader: F) -> Result<Arc<dyn ShaderCompiler>, BackendError>
where
    F: FnOnce() -> Option<Arc<dyn ShaderCompiler>>,
{
    let mut slot = slot();
    if let Some(compiler) = slot.as_ref() {
        return Ok(Arc::clone(compiler));
    }
    let Some(compiler) = loader() else {
        warn!("shader compiler module could not be loaded");
        return Err(BackendError::CompilerUnavailable);
    };
    info!("shader compiler module loaded");
    *slot = Some(Arc::clone(&compiler));
    Ok(compiler)
}

/// The loaded compiler module, if any.
pub fn compiler() -> Result<Arc<dyn ShaderCompiler>, BackendError> {
    slot().clone().ok_or(BackendError::CompilerUnavailable)
}

/// Release the process-wide module. Call once at process exit; instances still holding the
/// module keep it alive until they drop it.
pub fn unload_compiler() {
    if slot().take().is_some() {
        debug!("shader compiler module unloaded");
    }
}

/// Flag sets tried in order until one compiles.
pub(crate) fn flag_attempts(base: CompileFlags) -> [(&'static str, CompileFlags); 3] {
    [
        ("default", base),
        ("avoid flow control", base | CompileFlags::AVOID_FLOW_CONTROL),
        ("prefer flow control", base | CompileFlags::PREFER_FLOW_CONTROL),
    ]
}

/// Compile `source`, retrying with alternate flow-control flags. On total failure the error
/// carries the diagnostics of every attempt.
pub fn compile(source: &str, profile: ShaderProfile) -> Result<Vec<u8>, BackendError> {
    let compiler = compiler()?;
    let mut diagnostics = Vec::new();
    for (name, flags) in flag_attempts(CompileFlags::OPTIMIZATION_LEVEL3) {
        match compiler.compile(source, profile, flags) {
            Ok(bytecode) => {
                if !diagnostics.is_empty() {
                    debug!(profile = profile.as_str(), attempt = name, "shader compiled after retry");
                }
                return Ok(bytecode);
            }
            Err(message) => {
                debug!(profile = profile.as_str(), attempt = name, %message, "shader compile attempt failed");
                diagnostics.push(format!("{name}: {message}"));
            }
        }
    }
    Err(BackendError::Compile(diagnostics.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts only sources that compile with flow control avoided.
    struct FussyCompiler;

    impl ShaderCompiler for FussyCompiler {
        fn compile(
            &self,
            source: &str,
            profile: ShaderProfile,
            flags: CompileFlags,
        ) -> Result<Vec<u8>, String> {
            if source.contains("error") {
                return Err(format!("{}: syntax error", profile.as_str()));
            }
            if source.contains("loop") && !flags.contains(CompileFlags::AVOID_FLOW_CONTROL) {
                return Err("too many instructions".to_string());
            }
            Ok(source.as_bytes().to_vec())
        }
    }

    // One test drives the process-wide slot so parallel tests never observe each other.
    #[test]
    fn module_lifecycle_and_flag_fallback() {
        unload_compiler();
        let profile = ShaderProfile::new(ShaderStage::Pixel, ShaderModel::Sm3);
        assert!(matches!(
            compile("main", profile),
            Err(BackendError::CompilerUnavailable)
        ));
        assert!(matches!(
            load_compiler(|| None),
            Err(BackendError::CompilerUnavailable)
        ));

        load_compiler(|| Some(Arc::new(FussyCompiler) as Arc<dyn ShaderCompiler>)).unwrap();
        // Already loaded: the loader is not consulted again.
        load_compiler(|| panic!("loaded twice")).unwrap();

        assert_eq!(compile("main", profile).unwrap(), b"main".to_vec());
        assert_eq!(compile("loop", profile).unwrap(), b"loop".to_vec());
        let Err(BackendError::Compile(diagnostics)) = compile("error", profile) else {
            panic!("expected a compile error");
        };
        assert_eq!(diagnostics.lines().count(), 3);
        assert!(diagnostics.starts_with("default: ps_3_0: syntax error"));

        unload_compiler();
        assert!(matches!(compiler(), Err(BackendError::CompilerUnavailable)));
    }

    #[test]
    fn profiles_name_the_shader_model() {
        assert_eq!(
            ShaderProfile::new(ShaderStage::Vertex, ShaderModel::Sm2).as_str(),
            "vs_2_0"
        );
        assert_eq!(
            ShaderProfile::new(ShaderStage::Pixel, ShaderModel::Sm3).as_str(),
            "ps_3_0"
        );
    }
}
