//! The compiler module is process-wide, so everything touching it lives in this one test.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use aero_gles_d3d9::compiler::{
    self, CompileFlags, ShaderCompiler, ShaderProfile, ShaderStage,
};
use aero_gles_d3d9::BackendError;

/// Rejects sources containing `loop` unless flow control is avoided.
#[derive(Default)]
struct FlowControlSensitive {
    calls: AtomicU32,
}

impl ShaderCompiler for FlowControlSensitive {
    fn compile(
        &self,
        source: &str,
        profile: ShaderProfile,
        flags: CompileFlags,
    ) -> Result<Vec<u8>, String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if source.contains("syntax error") {
            return Err("X3000: syntax error".to_string());
        }
        if source.contains("loop") && !flags.contains(CompileFlags::AVOID_FLOW_CONTROL) {
            return Err("X4014: too many instructions".to_string());
        }
        Ok(profile.as_str().as_bytes().to_vec())
    }
}

#[test]
fn compiler_module_lifecycle() {
    let mut backend = common::backend();

    compiler::unload_compiler();
    assert!(matches!(
        backend.compile_shader("float4 main() : COLOR { return 0; }", ShaderStage::Pixel),
        Err(BackendError::CompilerUnavailable)
    ));
    assert!(matches!(
        compiler::load_compiler(|| None),
        Err(BackendError::CompilerUnavailable)
    ));

    let module = Arc::new(FlowControlSensitive::default());
    let loaded = compiler::load_compiler({
        let module = Arc::clone(&module);
        move || Some(module as Arc<dyn ShaderCompiler>)
    })
    .unwrap();
    // A second load reuses the module without running the loader.
    compiler::load_compiler(|| panic!("loader must not run twice")).unwrap();
    drop(loaded);

    let bytecode = backend
        .compile_shader("float4 main() : COLOR { return 0; }", ShaderStage::Pixel)
        .unwrap();
    assert_eq!(bytecode, b"ps_3_0");
    assert_eq!(module.calls.load(Ordering::Relaxed), 1);

    let bytecode = backend
        .compile_shader("loop", ShaderStage::Vertex)
        .unwrap();
    assert_eq!(bytecode, b"vs_3_0");
    assert_eq!(module.calls.load(Ordering::Relaxed), 3);

    let err = backend
        .compile_shader("syntax error", ShaderStage::Vertex)
        .unwrap_err();
    let diagnostics = match err {
        BackendError::Compile(diagnostics) => diagnostics,
        other => panic!("expected compile diagnostics, got {other:?}"),
    };
    assert_eq!(diagnostics.lines().count(), 3);
    assert!(diagnostics.starts_with("default: X3000"));

    // Compiled bytecode feeds the shader object cache.
    let shader = backend.create_pixel_shader(&bytecode).unwrap();
    assert_eq!(backend.create_pixel_shader(&bytecode).unwrap(), shader);

    compiler::unload_compiler();
    assert!(compiler::compiler().is_err());
}
