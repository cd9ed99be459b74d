//! WGSL sources for the compute kernels and the point renderer.
//!
//! The compute kernels read and write flat `array<f32>` buffers (three
//! floats per position/color, two per phase/lifetime pair) so the CPU side
//! can use plain `Vec<f32>` without vec3 padding.

/// Threads per workgroup for both compute kernels.
pub const WORKGROUP_SIZE: u32 = 64;

/// Lowest brightness factor of a twinkling star.
pub const TWINKLE_FLOOR: f32 = 0.7;
/// Amplitude of the twinkle on top of the floor.
pub const TWINKLE_AMPLITUDE: f32 = 0.3;

/// Twinkle kernel: `color = base * (floor + amplitude * sin(time * speed + phase))`.
///
/// Bindings: 0 uniforms, 1 base colors (rgb), 2 phases (phase, speed), 3 colors out (rgb).
pub const TWINKLE_WGSL: &str = r#"
struct TwinkleUniforms {
    time: f32,
    count: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0) var<uniform> params: TwinkleUniforms;
@group(0) @binding(1) var<storage, read> base_colors: array<f32>;
@group(0) @binding(2) var<storage, read> phases: array<f32>;
@group(0) @binding(3) var<storage, read_write> colors: array<f32>;

const TWINKLE_FLOOR: f32 = 0.7;
const TWINKLE_AMPLITUDE: f32 = 0.3;

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if i >= params.count {
        return;
    }

    let phase = phases[i * 2u];
    let speed = phases[i * 2u + 1u];
    let factor = TWINKLE_FLOOR + TWINKLE_AMPLITUDE * sin(params.time * speed + phase);

    colors[i * 3u] = base_colors[i * 3u] * factor;
    colors[i * 3u + 1u] = base_colors[i * 3u + 1u] * factor;
    colors[i * 3u + 2u] = base_colors[i * 3u + 2u] * factor;
}
"#;

/// Solar-wind kernel: advance positions, burn lifetime, respawn near the origin.
///
/// Bindings: 0 uniforms, 1 velocities (xyz), 2 positions (xyz, in/out),
/// 3 lifetimes (remaining, max; in/out).
pub const SOLAR_WIND_WGSL: &str = r#"
struct WindUniforms {
    origin: vec3<f32>,
    time: f32,
    delta_time: f32,
    speed: f32,
    max_radius: f32,
    spawn_radius: f32,
    count: u32,
    seed: u32,
    _pad0: u32,
    _pad1: u32,
};

@group(0) @binding(0) var<uniform> params: WindUniforms;
@group(0) @binding(1) var<storage, read> velocities: array<f32>;
@group(0) @binding(2) var<storage, read_write> positions: array<f32>;
@group(0) @binding(3) var<storage, read_write> lifetimes: array<f32>;

fn pcg_hash(input: u32) -> u32 {
    let state = input * 747796405u + 2891336453u;
    let word = ((state >> ((state >> 28u) + 4u)) ^ state) * 277803737u;
    return (word >> 22u) ^ word;
}

fn jitter(index: u32, axis: u32, seed: u32) -> f32 {
    let h = pcg_hash(index * 3u + axis + seed * 2654435769u);
    return (f32(h >> 8u) / 16777215.0) * 2.0 - 1.0;
}

@compute @workgroup_size(64)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let i = global_id.x;
    if i >= params.count {
        return;
    }

    let velocity = vec3<f32>(velocities[i * 3u], velocities[i * 3u + 1u], velocities[i * 3u + 2u]);
    var position = vec3<f32>(positions[i * 3u], positions[i * 3u + 1u], positions[i * 3u + 2u]);
    var remaining = lifetimes[i * 2u];
    let max_life = lifetimes[i * 2u + 1u];

    position += velocity * params.delta_time * params.speed;
    remaining -= params.delta_time;

    if remaining <= 0.0 || distance(position, params.origin) > params.max_radius {
        position = params.origin + vec3<f32>(
            jitter(i, 0u, params.seed),
            jitter(i, 1u, params.seed),
            jitter(i, 2u, params.seed),
        ) * params.spawn_radius;
        remaining = max_life;
    }

    positions[i * 3u] = position.x;
    positions[i * 3u + 1u] = position.y;
    positions[i * 3u + 2u] = position.z;
    lifetimes[i * 2u] = remaining;
}
"#;

/// CPU twin of the WGSL `pcg_hash`.
#[inline]
pub fn pcg_hash(input: u32) -> u32 {
    let state = input.wrapping_mul(747796405).wrapping_add(2891336453);
    let word = ((state >> ((state >> 28) + 4)) ^ state).wrapping_mul(277803737);
    (word >> 22) ^ word
}

/// CPU twin of the WGSL `jitter`: a value in -1..=1.
#[inline]
pub fn jitter(index: u32, axis: u32, seed: u32) -> f32 {
    let h = pcg_hash(
        index
            .wrapping_mul(3)
            .wrapping_add(axis)
            .wrapping_add(seed.wrapping_mul(2654435769)),
    );
    ((h >> 8) as f32 / 16777215.0) * 2.0 - 1.0
}

/// Instanced soft point sprites. Vertex buffer 0 is positions, 1 is colors.
pub const POINT_RENDER_WGSL: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    point_size: f32,
    aspect: f32,
    _pad0: f32,
    _pad1: f32,
};

@group(0) @binding(0) var<uniform> camera: Camera;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec3<f32>,
    @location(1) uv: vec2<f32>,
};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) position: vec3<f32>,
    @location(1) color: vec3<f32>,
) -> VertexOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vertex_index];

    var clip = camera.view_proj * vec4<f32>(position, 1.0);
    clip.x += corner.x * camera.point_size * clip.w / camera.aspect;
    clip.y += corner.y * camera.point_size * clip.w;

    var out: VertexOutput;
    out.clip_position = clip;
    out.color = color;
    out.uv = corner;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let dist = length(in.uv);
    if dist > 1.0 {
        discard;
    }
    let alpha = 1.0 - smoothstep(0.4, 1.0, dist);
    return vec4<f32>(in.color, alpha);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn validate_wgsl(code: &str) -> Result<(), String> {
        let module = naga::front::wgsl::parse_str(code)
            .map_err(|e| format!("WGSL parse error: {:?}", e))?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| format!("WGSL validation error: {:?}", e))?;

        Ok(())
    }

    #[test]
    fn test_twinkle_wgsl_valid() {
        validate_wgsl(TWINKLE_WGSL).expect("twinkle kernel should be valid");
        assert!(TWINKLE_WGSL.contains(&format!("@workgroup_size({})", WORKGROUP_SIZE)));
    }

    #[test]
    fn test_solar_wind_wgsl_valid() {
        validate_wgsl(SOLAR_WIND_WGSL).expect("solar wind kernel should be valid");
        assert!(SOLAR_WIND_WGSL.contains(&format!("@workgroup_size({})", WORKGROUP_SIZE)));
    }

    #[test]
    fn test_point_render_wgsl_valid() {
        validate_wgsl(POINT_RENDER_WGSL).expect("point renderer should be valid");
    }

    #[test]
    fn test_twinkle_constants_match_kernel() {
        assert!(TWINKLE_WGSL.contains(&format!("TWINKLE_FLOOR: f32 = {:?}", TWINKLE_FLOOR)));
        assert!(TWINKLE_WGSL.contains(&format!("TWINKLE_AMPLITUDE: f32 = {:?}", TWINKLE_AMPLITUDE)));
    }

    #[test]
    fn test_jitter_range_and_determinism() {
        for i in 0..1000 {
            let v = jitter(i, i % 3, 7);
            assert!((-1.0..=1.0).contains(&v));
            assert_eq!(v, jitter(i, i % 3, 7));
        }
        assert_ne!(jitter(1, 0, 0), jitter(1, 0, 1));
    }

    #[test]
    fn test_pcg_hash_known_values() {
        assert_eq!(pcg_hash(0), pcg_hash(0));
        assert_ne!(pcg_hash(0), pcg_hash(1));
    }
}
