//! Common test utilities for end-to-end GPU tests.
//!
//! Provides a hand-assembled copy kernel, scratch kernel files and a context
//! constructor that skips cleanly when no Vulkan device is available.

#![allow(dead_code)]

use basalt_runtime::{
    AcceleratorContext, BufferSpecification, ContextConfig, PipelineSpecification, TaskBuilder,
};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// SPIR-V 1.0 for `shaders/copy.comp`:
/// `if (i < src.length() && i < dst.length()) dst[i] = src[i];` with
/// `local_size_x = 64`, `src` at binding 0 and `dst` at binding 1.
pub const COPY_KERNEL: &[u32] = &[
    // header: magic, version 1.0, generator, bound, schema
    0x07230203, 0x00010000, 0x00000000, 0x0000001e, 0x00000000,
    // OpCapability Shader
    0x00020011, 0x00000001,
    // OpMemoryModel Logical GLSL450
    0x0003000e, 0x00000000, 0x00000001,
    // OpEntryPoint GLCompute %main "main" %gid
    0x0006000f, 0x00000005, 0x00000001, 0x6e69616d, 0x00000000, 0x00000002,
    // OpExecutionMode %main LocalSize 64 1 1
    0x00060010, 0x00000001, 0x00000011, 0x00000040, 0x00000001, 0x00000001,
    // OpDecorate %gid BuiltIn GlobalInvocationId
    0x00040047, 0x00000002, 0x0000000b, 0x0000001c,
    // OpDecorate %rtarr ArrayStride 4
    0x00040047, 0x00000008, 0x00000006, 0x00000004,
    // OpMemberDecorate %Buf 0 Offset 0
    0x00050048, 0x00000009, 0x00000000, 0x00000023, 0x00000000,
    // OpDecorate %Buf BufferBlock
    0x00030047, 0x00000009, 0x00000003,
    // OpDecorate %src DescriptorSet 0
    0x00040047, 0x0000000b, 0x00000022, 0x00000000,
    // OpDecorate %src Binding 0
    0x00040047, 0x0000000b, 0x00000021, 0x00000000,
    // OpDecorate %dst DescriptorSet 0
    0x00040047, 0x0000000c, 0x00000022, 0x00000000,
    // OpDecorate %dst Binding 1
    0x00040047, 0x0000000c, 0x00000021, 0x00000001,
    // %void = OpTypeVoid
    0x00020013, 0x00000003,
    // %fn = OpTypeFunction %void
    0x00030021, 0x00000004, 0x00000003,
    // %uint = OpTypeInt 32 0
    0x00040015, 0x00000005, 0x00000020, 0x00000000,
    // %v3uint = OpTypeVector %uint 3
    0x00040017, 0x00000006, 0x00000005, 0x00000003,
    // %ptr_in_v3 = OpTypePointer Input %v3uint
    0x00040020, 0x00000007, 0x00000001, 0x00000006,
    // %gid = OpVariable %ptr_in_v3 Input
    0x0004003b, 0x00000007, 0x00000002, 0x00000001,
    // %rtarr = OpTypeRuntimeArray %uint
    0x0003001d, 0x00000008, 0x00000005,
    // %Buf = OpTypeStruct %rtarr
    0x0003001e, 0x00000009, 0x00000008,
    // %ptr_u_Buf = OpTypePointer Uniform %Buf
    0x00040020, 0x0000000a, 0x00000002, 0x00000009,
    // %src = OpVariable %ptr_u_Buf Uniform
    0x0004003b, 0x0000000a, 0x0000000b, 0x00000002,
    // %dst = OpVariable %ptr_u_Buf Uniform
    0x0004003b, 0x0000000a, 0x0000000c, 0x00000002,
    // %int = OpTypeInt 32 1
    0x00040015, 0x0000000d, 0x00000020, 0x00000001,
    // %int0 = OpConstant %int 0
    0x0004002b, 0x0000000d, 0x0000000e, 0x00000000,
    // %ptr_u_uint = OpTypePointer Uniform %uint
    0x00040020, 0x0000000f, 0x00000002, 0x00000005,
    // %bool = OpTypeBool
    0x00020014, 0x00000010,
    // %main = OpFunction %void None %fn
    0x00050036, 0x00000003, 0x00000001, 0x00000000, 0x00000004,
    // %entry = OpLabel
    0x000200f8, 0x00000011,
    // %gv = OpLoad %v3uint %gid
    0x0004003d, 0x00000006, 0x00000012, 0x00000002,
    // %idx = OpCompositeExtract %uint %gv 0
    0x00050051, 0x00000005, 0x00000013, 0x00000012, 0x00000000,
    // %slen = OpArrayLength %uint %src 0
    0x00050044, 0x00000005, 0x00000014, 0x0000000b, 0x00000000,
    // %dlen = OpArrayLength %uint %dst 0
    0x00050044, 0x00000005, 0x00000015, 0x0000000c, 0x00000000,
    // %c1 = OpULessThan %bool %idx %slen
    0x000500b0, 0x00000010, 0x00000016, 0x00000013, 0x00000014,
    // %c2 = OpULessThan %bool %idx %dlen
    0x000500b0, 0x00000010, 0x00000017, 0x00000013, 0x00000015,
    // %c = OpLogicalAnd %bool %c1 %c2
    0x000500a7, 0x00000010, 0x00000018, 0x00000016, 0x00000017,
    // OpSelectionMerge %merge None
    0x000300f7, 0x0000001a, 0x00000000,
    // OpBranchConditional %c %body %merge
    0x000400fa, 0x00000018, 0x00000019, 0x0000001a,
    // %body = OpLabel
    0x000200f8, 0x00000019,
    // %sp = OpAccessChain %ptr_u_uint %src %int0 %idx
    0x00060041, 0x0000000f, 0x0000001b, 0x0000000b, 0x0000000e, 0x00000013,
    // %v = OpLoad %uint %sp
    0x0004003d, 0x00000005, 0x0000001c, 0x0000001b,
    // %dp = OpAccessChain %ptr_u_uint %dst %int0 %idx
    0x00060041, 0x0000000f, 0x0000001d, 0x0000000c, 0x0000000e, 0x00000013,
    // OpStore %dp %v
    0x0003003e, 0x0000001d, 0x0000001c,
    // OpBranch %merge
    0x000200f9, 0x0000001a,
    // %merge = OpLabel
    0x000200f8, 0x0000001a,
    // OpReturn
    0x000100fd,
    // OpFunctionEnd
    0x00010038,
];

/// Write `words` to a fresh temporary `.spv` file.
pub fn write_kernel(words: &[u32]) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".spv")
        .tempfile()
        .expect("Failed to create temp kernel file");
    file.write_all(bytemuck::cast_slice(words))
        .expect("Failed to write kernel");
    file.flush().expect("Failed to flush kernel");
    file
}

pub fn copy_kernel() -> NamedTempFile {
    write_kernel(COPY_KERNEL)
}

/// Bring up a context with validation off, or print why the test is skipped.
pub fn try_context() -> Option<AcceleratorContext> {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();

    match AcceleratorContext::with_config(ContextConfig::default().with_validation(false)) {
        Ok(context) => Some(context),
        Err(e) => {
            eprintln!("Skipping test: Vulkan bring-up failed: {e}");
            eprintln!("This is expected if no GPU is available (e.g., in CI)");
            None
        }
    }
}

/// Builder for the copy kernel with `count` u32 elements on each side.
pub fn copy_builder<'ctx>(
    context: &'ctx AcceleratorContext,
    kernel: &Path,
    count: u32,
) -> TaskBuilder<'ctx> {
    TaskBuilder::new(context)
        .shader(kernel)
        .buffers(BufferSpecification::symmetric(count, 4))
        .pipeline(PipelineSpecification::storage_pair())
}
