//! Device tests. They need a working adapter, so they are ignored by default:
//! `cargo test -p wgk-core -- --ignored`.

use approx::assert_relative_eq;
use rand::Rng;
use half::f16;
use wgk_core::tensor::DEFAULT_TENSOR_USAGE;
use wgk_core::{create_shader, create_shader_1d, Context, GpuError, NumType, Shape, TensorPool};

const COPY: &str = r#"
@group(0) @binding(0) var<storage, read_write> inp: array<{{precision}}>;
@group(0) @binding(1) var<storage, read_write> out: array<{{precision}}>;
@compute @workgroup_size({{workgroupSize}})
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i: u32 = id.x;
    if (i < arrayLength(&inp)) {
        out[i] = inp[i];
    }
}
"#;

const GELU: &str = r#"
const GELU_SCALING_FACTOR: f32 = 0.7978845608028654;
@group(0) @binding(0) var<storage, read_write> inp: array<{{precision}}>;
@group(0) @binding(1) var<storage, read_write> out: array<{{precision}}>;
@compute @workgroup_size({{workgroupSize}})
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i: u32 = id.x;
    if (i < arrayLength(&inp)) {
        let x: f32 = inp[i];
        out[i] = 0.5 * x * (1.0 + tanh(GELU_SCALING_FACTOR * (x + 0.044715 * x * x * x)));
    }
}
"#;

const SCALE: &str = r#"
struct Params {
    factor: f32,
};
@group(0) @binding(0) var<storage, read_write> inp: array<{{precision}}>;
@group(0) @binding(1) var<storage, read_write> out: array<{{precision}}>;
@group(0) @binding(2) var<uniform> params: Params;
@compute @workgroup_size({{workgroupSize}})
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let i: u32 = id.x;
    if (i < arrayLength(&inp)) {
        out[i] = inp[i] * params.factor;
    }
}
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn context() -> Context {
    init_tracing();
    Context::new().expect("GPU context")
}

fn gelu_ref(x: f32) -> f32 {
    0.5 * x * (1.0 + (0.797_884_6 * (x + 0.044715 * x * x * x)).tanh())
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_round_trip() {
    let mut ctx = context();
    let mut rng = rand::thread_rng();
    let data: Vec<f32> = (0..1000).map(|_| rng.gen_range(-10.0..10.0)).collect();

    let t = ctx.create_tensor_with([1000], &data).unwrap();
    let back: Vec<f32> = ctx.read_tensor(&t).unwrap();
    assert_eq!(back, data);
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_pool_tracks_create_and_free() {
    let mut ctx = context();
    let a = ctx.create_tensor([16, 16], NumType::F32).unwrap();
    let b = ctx.create_tensor([8], NumType::F32).unwrap();
    assert_eq!(ctx.tensor_pool().len(), 2);
    assert_eq!(a.size(), 16 * 16 * 4);
    assert_eq!(ctx.tensor_pool().allocated_bytes(), 16 * 16 * 4 + 8 * 4);

    assert!(ctx.free_tensor(&a));
    assert_eq!(ctx.tensor_pool().len(), 1);
    assert!(ctx.tensor(b.id()).is_some());

    // Second free of the same tensor is a logged no-op.
    assert!(!ctx.free_tensor(&a));
    assert_eq!(ctx.tensor_pool().len(), 1);
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_zero_element_tensor() {
    let mut ctx = context();
    let t = ctx.create_tensor([0, 4], NumType::F32).unwrap();
    assert_eq!(t.size(), 0);
    let back: Vec<f32> = ctx.read_tensor(&t).unwrap();
    assert!(back.is_empty());
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_typed_transfer_checks() {
    let mut ctx = context();
    let t = ctx.create_tensor([4], NumType::F32).unwrap();

    let short = [1.0f32; 3];
    assert!(matches!(ctx.to_gpu(&short, &t), Err(GpuError::SizeMismatch { .. })));

    let halves = [f16::from_f32(1.0); 4];
    assert!(matches!(ctx.to_gpu(&halves, &t), Err(GpuError::DTypeMismatch { .. })));

    // Raw buffer writes stay strict about alignment.
    assert!(matches!(
        ctx.to_gpu_buffer(&[0u8; 6], t.buffer()),
        Err(GpuError::Misaligned(6))
    ));

    // Tensor reads pad internally, so an odd-length prefix is fine.
    ctx.to_gpu(&[1.0f32, 2.0, 3.0, 4.0], &t).unwrap();
    let mut prefix = [0u8; 6];
    ctx.to_cpu_bytes(&t, &mut prefix).unwrap();
    assert_eq!(&prefix[..4], &1.0f32.to_ne_bytes());
    assert_eq!(&prefix[4..], &2.0f32.to_ne_bytes()[..2]);
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_odd_length_f16_round_trip() {
    let mut ctx = context();
    let data: Vec<f16> = [0.5f32, -1.0, 2.25, 3.0, -7.5].iter().map(|&x| f16::from_f32(x)).collect();

    let t = ctx.create_tensor_with([5], &data).unwrap();
    assert_eq!(t.size(), 10);
    assert_eq!(t.buffer().size(), 12);
    assert_eq!(ctx.read_tensor::<f16>(&t).unwrap(), data);

    let empty = ctx.create_tensor([3], NumType::F16).unwrap();
    ctx.to_gpu(&data[..3], &empty).unwrap();
    assert_eq!(ctx.read_tensor::<f16>(&empty).unwrap(), &data[..3]);
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_failed_create_with_data_leaves_pool_unchanged() {
    let mut ctx = context();
    let before = ctx.tensor_pool().len();

    let err = ctx.create_tensor_with([4], &[1.0f32; 3]).unwrap_err();
    assert!(matches!(err, GpuError::SizeMismatch { expected: 16, got: 12 }));
    assert_eq!(ctx.tensor_pool().len(), before);
    assert_eq!(ctx.tensor_pool().allocated_bytes(), 0);

    ctx.create_tensor_with([3], &[f16::from_f32(1.0); 3]).unwrap();
    assert_eq!(ctx.tensor_pool().len(), before + 1);
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_pool_free_all_releases_every_tensor() {
    let ctx = context();
    let mut pool = TensorPool::new();
    let n = 5;
    let tensors: Vec<_> = (1..=n)
        .map(|i| {
            pool.create(ctx.device(), Shape::from([i * 4]), NumType::F32, DEFAULT_TENSOR_USAGE)
                .unwrap()
        })
        .collect();
    assert_eq!(pool.len(), n);
    assert_eq!(pool.allocated_bytes(), (1..=n as u64).map(|i| i * 16).sum::<u64>());

    pool.free_all();
    assert_eq!(pool.len(), 0);
    assert!(pool.is_empty());
    assert_eq!(pool.allocated_bytes(), 0);
    assert!(tensors.iter().all(|t| !pool.contains(t.id())));

    // The buffers were destroyed, not just unregistered.
    let err = ctx.to_gpu_buffer(&[0u8; 16], tensors[0].buffer()).unwrap_err();
    assert!(matches!(err, GpuError::Validation { .. }));
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_pool_drop_destroys_buffers() {
    let ctx = context();
    let mut pool = TensorPool::new();
    let t = pool
        .create(ctx.device(), Shape::from([8]), NumType::F32, DEFAULT_TENSOR_USAGE)
        .unwrap();
    ctx.to_gpu_buffer(&[0u8; 32], t.buffer()).unwrap();

    drop(pool);
    assert!(matches!(
        ctx.to_gpu_buffer(&[0u8; 32], t.buffer()),
        Err(GpuError::Validation { .. })
    ));
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_gelu_dispatch() {
    let mut ctx = context();
    let n = 10_000;
    let input: Vec<f32> = (0..n).map(|i| (i as f32 / n as f32) * 6.0 - 3.0).collect();

    let inp = ctx.create_tensor_with([n], &input).unwrap();
    let out = ctx.create_tensor([n], NumType::F32).unwrap();
    let shader = create_shader_1d(GELU, 256, NumType::F32);
    let kernel = ctx.create_kernel(&shader, &[&inp, &out], [n, 1, 1], None).unwrap();

    let k = ctx.kernel(kernel).unwrap();
    assert_eq!(k.num_bindings(), 2);
    assert!(!k.has_params());
    assert_eq!(k.workgroups(), [40, 1, 1]);

    ctx.run_kernel(kernel).unwrap();
    let result: Vec<f32> = ctx.read_tensor(&out).unwrap();
    for (x, y) in input.iter().zip(&result) {
        assert_relative_eq!(*y, gelu_ref(*x), epsilon = 1e-4);
    }
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_params_binding() {
    let mut ctx = context();
    let input = vec![1.0f32, 2.0, 3.0, 4.0];
    let inp = ctx.create_tensor_with([4], &input).unwrap();
    let out = ctx.create_tensor([4], NumType::F32).unwrap();
    let shader = create_shader(SCALE, Shape::from([64, 1, 1]), NumType::F32);

    let kernel = ctx
        .create_kernel_with_params(&shader, &[&inp, &out], [4, 1, 1], &2.5f32)
        .unwrap();
    assert_eq!(ctx.kernel(kernel).unwrap().num_bindings(), 3);
    assert!(ctx.kernel(kernel).unwrap().has_params());

    ctx.run_kernel(kernel).unwrap();
    let result: Vec<f32> = ctx.read_tensor(&out).unwrap();
    assert_eq!(result, vec![2.5, 5.0, 7.5, 10.0]);
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_empty_params_mean_no_params() {
    let mut ctx = context();
    let inp = ctx.create_tensor([4], NumType::F32).unwrap();
    let out = ctx.create_tensor([4], NumType::F32).unwrap();
    let shader = create_shader_1d(COPY, 64, NumType::F32);
    let kernel = ctx.create_kernel(&shader, &[&inp, &out], [4, 1, 1], Some(&[0u8; 0][..])).unwrap();
    assert_eq!(ctx.kernel(kernel).unwrap().num_bindings(), 2);
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_redispatch_requires_reset() {
    let mut ctx = context();
    let input = vec![7.0f32; 64];
    let inp = ctx.create_tensor_with([64], &input).unwrap();
    let out = ctx.create_tensor([64], NumType::F32).unwrap();
    let shader = create_shader_1d(COPY, 64, NumType::F32);
    let kernel = ctx.create_kernel(&shader, &[&inp, &out], [64, 1, 1], None).unwrap();

    ctx.run_kernel(kernel).unwrap();
    assert!(!ctx.kernel(kernel).unwrap().is_ready());
    assert!(matches!(
        ctx.dispatch_kernel(kernel),
        Err(GpuError::CommandBufferConsumed(id)) if id == kernel
    ));

    ctx.to_gpu(&vec![9.0f32; 64], &inp).unwrap();
    ctx.reset_command_buffer(kernel).unwrap();
    ctx.run_kernel(kernel).unwrap();
    let result: Vec<f32> = ctx.read_tensor(&out).unwrap();
    assert!(result.iter().all(|&v| v == 9.0));
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_freed_input_is_stale() {
    let mut ctx = context();
    let inp = ctx.create_tensor([16], NumType::F32).unwrap();
    let out = ctx.create_tensor([16], NumType::F32).unwrap();
    let shader = create_shader_1d(COPY, 16, NumType::F32);
    let kernel = ctx.create_kernel(&shader, &[&inp, &out], [16, 1, 1], None).unwrap();

    ctx.free_tensor(&inp);
    assert!(matches!(
        ctx.dispatch_kernel(kernel),
        Err(GpuError::StaleTensor(id)) if id == inp.id()
    ));
    assert!(matches!(
        ctx.create_kernel(&shader, &[&inp, &out], [16, 1, 1], None),
        Err(GpuError::StaleTensor(_))
    ));
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_invalid_wgsl_is_validation_error() {
    let mut ctx = context();
    let inp = ctx.create_tensor([4], NumType::F32).unwrap();
    let shader = create_shader_1d("fn main( { this is not wgsl", 64, NumType::F32);
    let err = ctx.create_kernel(&shader, &[&inp], [4, 1, 1], None).unwrap_err();
    assert!(matches!(err, GpuError::Validation { .. }));
    assert_eq!(ctx.kernel_pool().len(), 0);
}

#[test]
#[ignore = "requires GPU adapter - run manually on machines with a GPU"]
fn test_teardown_with_live_resources() {
    let mut ctx = context();
    let inp = ctx.create_tensor([32], NumType::F32).unwrap();
    let out = ctx.create_tensor([32], NumType::F32).unwrap();
    let shader = create_shader_1d(COPY, 32, NumType::F32);
    ctx.create_kernel(&shader, &[&inp, &out], [32, 1, 1], None).unwrap();
    assert_eq!(ctx.kernel_pool().len(), 1);
    assert_eq!(ctx.tensor_pool().len(), 2);
    assert_eq!(ctx.tensor_pool().allocated_bytes(), 2 * 32 * 4);
    drop(ctx);
}
