use glow::{Context, HasContext as _};
use nalgebra::{Matrix4, Point3};

use super::asset::SceneMesh;
use super::lighting::{EnvTexture, Environment, LightRig, Lighting};

/// Clear colour when no environment map is shown (#F5F5F4).
const BACKGROUND: [f32; 3] = [0.961, 0.961, 0.957];

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("shader compilation failed: {0}")]
    Shader(String),
    #[error("program link failed: {0}")]
    Link(String),
    #[error("could not create GL object: {0}")]
    Create(String),
}

/// Per-frame inputs, copied into the paint callback.
#[derive(Debug, Clone, Copy)]
pub struct FrameUniforms {
    pub mvp: Matrix4<f32>,
    pub model: Matrix4<f32>,
    pub eye: Point3<f32>,
    pub inv_view_proj: Matrix4<f32>,
}

const MESH_VS: &str = r#"#version 300 es
    precision highp float;
    uniform mat4 u_mvp;
    uniform mat4 u_model;
    layout(location = 0) in vec3 a_pos;
    layout(location = 1) in vec3 a_nrm;
    layout(location = 2) in vec3 a_col;
    out vec3 v_world;
    out vec3 v_nrm;
    out vec3 v_col;
    void main() {
        v_world = (u_model * vec4(a_pos, 1.0)).xyz;
        v_nrm = mat3(u_model) * a_nrm;
        v_col = a_col;
        gl_Position = u_mvp * vec4(a_pos, 1.0);
    }"#;

const MESH_FS: &str = r#"#version 300 es
    precision highp float;
    const float PI = 3.14159265;
    uniform int u_mode;
    uniform vec3 u_eye;
    uniform vec3 u_ambient;
    uniform vec3 u_light_dir[3];
    uniform vec3 u_light_col[3];
    uniform vec3 u_sh[9];
    uniform sampler2D u_reflection;
    in vec3 v_world;
    in vec3 v_nrm;
    in vec3 v_col;
    out vec4 o_col;

    vec2 equirect(vec3 d) {
        d = normalize(d);
        return vec2(atan(d.z, d.x) / (2.0 * PI) + 0.5, acos(clamp(d.y, -1.0, 1.0)) / PI);
    }

    vec3 sh_irradiance(vec3 n) {
        return u_sh[0] * 0.282095
             + u_sh[1] * 0.488603 * n.y
             + u_sh[2] * 0.488603 * n.z
             + u_sh[3] * 0.488603 * n.x
             + u_sh[4] * 1.092548 * n.x * n.y
             + u_sh[5] * 1.092548 * n.y * n.z
             + u_sh[6] * 0.315392 * (3.0 * n.z * n.z - 1.0)
             + u_sh[7] * 1.092548 * n.x * n.z
             + u_sh[8] * 0.546274 * (n.x * n.x - n.y * n.y);
    }

    void main() {
        vec3 n = normalize(v_nrm);
        if (!gl_FrontFacing) { n = -n; }
        vec3 color;
        if (u_mode == 1) {
            vec3 v = normalize(u_eye - v_world);
            float fresnel = 0.04 + 0.96 * pow(1.0 - max(dot(n, v), 0.0), 5.0);
            vec3 diffuse = v_col * max(sh_irradiance(n), vec3(0.0)) / PI;
            vec3 spec = pow(texture(u_reflection, equirect(reflect(-v, n))).rgb, vec3(2.2));
            color = mix(diffuse, spec, fresnel * 0.5);
            color = color / (1.0 + color);
        } else {
            color = v_col * u_ambient;
            for (int i = 0; i < 3; i++) {
                color += v_col * u_light_col[i] * max(dot(n, normalize(u_light_dir[i])), 0.0);
            }
        }
        o_col = vec4(pow(clamp(color, 0.0, 1.0), vec3(1.0 / 2.2)), 1.0);
    }"#;

const BACKGROUND_VS: &str = r#"#version 300 es
    precision highp float;
    uniform mat4 u_inv_view_proj;
    out vec3 v_dir;
    void main() {
        vec2 p = vec2(float((gl_VertexID << 1) & 2), float(gl_VertexID & 2)) * 2.0 - 1.0;
        vec4 far_pt = u_inv_view_proj * vec4(p, 1.0, 1.0);
        vec4 near_pt = u_inv_view_proj * vec4(p, -1.0, 1.0);
        v_dir = far_pt.xyz / far_pt.w - near_pt.xyz / near_pt.w;
        gl_Position = vec4(p, 1.0, 1.0);
    }"#;

const BACKGROUND_FS: &str = r#"#version 300 es
    precision highp float;
    const float PI = 3.14159265;
    uniform sampler2D u_env;
    in vec3 v_dir;
    out vec4 o_col;
    void main() {
        vec3 d = normalize(v_dir);
        vec2 uv = vec2(atan(d.z, d.x) / (2.0 * PI) + 0.5, acos(clamp(d.y, -1.0, 1.0)) / PI);
        o_col = vec4(texture(u_env, uv).rgb, 1.0);
    }"#;

struct MeshUniforms {
    mvp: Option<glow::UniformLocation>,
    model: Option<glow::UniformLocation>,
    mode: Option<glow::UniformLocation>,
    eye: Option<glow::UniformLocation>,
    ambient: Option<glow::UniformLocation>,
    light_dir: Option<glow::UniformLocation>,
    light_col: Option<glow::UniformLocation>,
    sh: Option<glow::UniformLocation>,
    reflection: Option<glow::UniformLocation>,
}

struct BackgroundPass {
    program: glow::Program,
    vao: glow::VertexArray,
    texture: glow::Texture,
    u_inv_view_proj: Option<glow::UniformLocation>,
    u_env: Option<glow::UniformLocation>,
}

enum GpuLighting {
    Rig(LightRig),
    Image {
        sh: [f32; 27],
        reflection: glow::Texture,
        background: BackgroundPass,
    },
}

/// A GL object owned by a [`GpuScene`].
#[derive(Debug, Clone, Copy)]
enum GlObject {
    Program(glow::Program),
    VertexArray(glow::VertexArray),
    Buffer(glow::Buffer),
    Texture(glow::Texture),
}

unsafe fn delete_object(gl: &Context, object: GlObject) {
    unsafe {
        match object {
            GlObject::Program(program) => gl.delete_program(program),
            GlObject::VertexArray(vao) => gl.delete_vertex_array(vao),
            GlObject::Buffer(buffer) => gl.delete_buffer(buffer),
            GlObject::Texture(texture) => gl.delete_texture(texture),
        }
    }
}

/// Objects created so far; released newest first.
#[derive(Debug)]
struct Owned<T> {
    objects: Vec<T>,
}

impl<T: Copy> Owned<T> {
    fn new() -> Self {
        Self { objects: Vec::new() }
    }

    fn keep(&mut self, object: T) {
        self.objects.push(object);
    }

    fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn release(&mut self, mut delete: impl FnMut(T)) {
        while let Some(object) = self.objects.pop() {
            delete(object);
        }
    }
}

/// Runs `build`. If it fails, everything it kept is deleted before the error
/// is returned.
fn build_owned<T: Copy, R>(
    build: impl FnOnce(&mut Owned<T>) -> Result<R, RenderError>,
    delete: impl FnMut(T),
) -> Result<(R, Owned<T>), RenderError> {
    let mut owned = Owned::new();
    match build(&mut owned) {
        Ok(value) => Ok((value, owned)),
        Err(err) => {
            owned.release(delete);
            Err(err)
        }
    }
}

/// Everything the GPU holds for one displayed model.
///
/// Created once per (asset, environment) pair and released as a whole with
/// [`GpuScene::destroy`].
pub struct GpuScene {
    program: glow::Program,
    vao: glow::VertexArray,
    index_count: i32,
    uniforms: MeshUniforms,
    lighting: GpuLighting,
    objects: Owned<GlObject>,
}

unsafe impl Send for GpuScene {}
unsafe impl Sync for GpuScene {}

impl GpuScene {
    pub unsafe fn new(gl: &Context, mesh: &SceneMesh, lighting: &Lighting) -> Result<Self, RenderError> {
        let (scene, objects) = build_owned(
            |owned| unsafe { Self::build(gl, mesh, lighting, owned) },
            |object| unsafe { delete_object(gl, object) },
        )?;
        Ok(Self { objects, ..scene })
    }

    unsafe fn build(
        gl: &Context,
        mesh: &SceneMesh,
        lighting: &Lighting,
        owned: &mut Owned<GlObject>,
    ) -> Result<Self, RenderError> {
        unsafe {
            let program = link_program(gl, MESH_VS, MESH_FS)?;
            owned.keep(GlObject::Program(program));

            let vao = gl.create_vertex_array().map_err(RenderError::Create)?;
            owned.keep(GlObject::VertexArray(vao));
            let vbo = gl.create_buffer().map_err(RenderError::Create)?;
            owned.keep(GlObject::Buffer(vbo));
            let ebo = gl.create_buffer().map_err(RenderError::Create)?;
            owned.keep(GlObject::Buffer(ebo));

            gl.bind_vertex_array(Some(vao));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&mesh.interleaved()),
                glow::STATIC_DRAW,
            );
            // 9 floats per vertex: xyz, normal, rgb
            gl.enable_vertex_attrib_array(0);
            gl.vertex_attrib_pointer_f32(0, 3, glow::FLOAT, false, 36, 0);
            gl.enable_vertex_attrib_array(1);
            gl.vertex_attrib_pointer_f32(1, 3, glow::FLOAT, false, 36, 12);
            gl.enable_vertex_attrib_array(2);
            gl.vertex_attrib_pointer_f32(2, 3, glow::FLOAT, false, 36, 24);

            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ebo));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(&mesh.indices),
                glow::STATIC_DRAW,
            );
            gl.bind_vertex_array(None);

            let uniforms = MeshUniforms {
                mvp: gl.get_uniform_location(program, "u_mvp"),
                model: gl.get_uniform_location(program, "u_model"),
                mode: gl.get_uniform_location(program, "u_mode"),
                eye: gl.get_uniform_location(program, "u_eye"),
                ambient: gl.get_uniform_location(program, "u_ambient"),
                light_dir: gl.get_uniform_location(program, "u_light_dir"),
                light_col: gl.get_uniform_location(program, "u_light_col"),
                sh: gl.get_uniform_location(program, "u_sh"),
                reflection: gl.get_uniform_location(program, "u_reflection"),
            };

            let lighting = match lighting {
                Lighting::Rig(rig) => GpuLighting::Rig(*rig),
                Lighting::Image(env) => upload_environment(gl, env, owned)?,
            };

            Ok(Self {
                program,
                vao,
                index_count: mesh.indices.len() as i32,
                uniforms,
                lighting,
                objects: Owned::new(),
            })
        }
    }

    pub unsafe fn paint(&self, gl: &Context, frame: &FrameUniforms) {
        if self.objects.is_empty() {
            return;
        }
        unsafe {
            gl.clear_color(BACKGROUND[0], BACKGROUND[1], BACKGROUND[2], 1.0);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
            gl.disable(glow::CULL_FACE);

            if let GpuLighting::Image { background, .. } = &self.lighting {
                gl.disable(glow::DEPTH_TEST);
                gl.use_program(Some(background.program));
                gl.uniform_matrix_4_f32_slice(
                    background.u_inv_view_proj.as_ref(),
                    false,
                    frame.inv_view_proj.as_slice(),
                );
                gl.active_texture(glow::TEXTURE0);
                gl.bind_texture(glow::TEXTURE_2D, Some(background.texture));
                gl.uniform_1_i32(background.u_env.as_ref(), 0);
                gl.bind_vertex_array(Some(background.vao));
                gl.draw_arrays(glow::TRIANGLES, 0, 3);
            }

            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LEQUAL);
            gl.depth_mask(true);

            let u = &self.uniforms;
            gl.use_program(Some(self.program));
            gl.uniform_matrix_4_f32_slice(u.mvp.as_ref(), false, frame.mvp.as_slice());
            gl.uniform_matrix_4_f32_slice(u.model.as_ref(), false, frame.model.as_slice());
            gl.uniform_3_f32(u.eye.as_ref(), frame.eye.x, frame.eye.y, frame.eye.z);

            match &self.lighting {
                GpuLighting::Rig(rig) => {
                    let mut dirs = [0.0f32; 9];
                    let mut cols = [0.0f32; 9];
                    for (i, light) in rig.lights.iter().enumerate() {
                        dirs[i * 3..i * 3 + 3].copy_from_slice(light.direction.as_slice());
                        cols[i * 3..i * 3 + 3].copy_from_slice(&light.color);
                    }
                    gl.uniform_1_i32(u.mode.as_ref(), 0);
                    gl.uniform_3_f32_slice(u.ambient.as_ref(), &rig.ambient);
                    gl.uniform_3_f32_slice(u.light_dir.as_ref(), &dirs);
                    gl.uniform_3_f32_slice(u.light_col.as_ref(), &cols);
                }
                GpuLighting::Image { sh, reflection, .. } => {
                    gl.uniform_1_i32(u.mode.as_ref(), 1);
                    gl.uniform_3_f32_slice(u.sh.as_ref(), sh);
                    gl.active_texture(glow::TEXTURE0);
                    gl.bind_texture(glow::TEXTURE_2D, Some(*reflection));
                    gl.uniform_1_i32(u.reflection.as_ref(), 0);
                }
            }

            gl.bind_vertex_array(Some(self.vao));
            gl.draw_elements(glow::TRIANGLES, self.index_count, glow::UNSIGNED_INT, 0);
            gl.bind_vertex_array(None);
            gl.disable(glow::DEPTH_TEST);
        }
    }

    /// Releases every GL object. Painting afterwards is a no-op.
    pub unsafe fn destroy(&mut self, gl: &Context) {
        self.objects.release(|object| unsafe { delete_object(gl, object) });
    }
}

unsafe fn upload_environment(
    gl: &Context,
    env: &Environment,
    owned: &mut Owned<GlObject>,
) -> Result<GpuLighting, RenderError> {
    unsafe {
        let reflection = upload_texture(gl, &env.reflection, owned)?;
        let texture = upload_texture(gl, &env.background, owned)?;
        let program = link_program(gl, BACKGROUND_VS, BACKGROUND_FS)?;
        owned.keep(GlObject::Program(program));
        let vao = gl.create_vertex_array().map_err(RenderError::Create)?;
        owned.keep(GlObject::VertexArray(vao));
        let background = BackgroundPass {
            program,
            vao,
            texture,
            u_inv_view_proj: gl.get_uniform_location(program, "u_inv_view_proj"),
            u_env: gl.get_uniform_location(program, "u_env"),
        };
        Ok(GpuLighting::Image {
            sh: env.irradiance_uniform(),
            reflection,
            background,
        })
    }
}

unsafe fn upload_texture(
    gl: &Context,
    tex: &EnvTexture,
    owned: &mut Owned<GlObject>,
) -> Result<glow::Texture, RenderError> {
    unsafe {
        let texture = gl.create_texture().map_err(RenderError::Create)?;
        owned.keep(GlObject::Texture(texture));
        gl.bind_texture(glow::TEXTURE_2D, Some(texture));
        gl.tex_image_2d(
            glow::TEXTURE_2D,
            0,
            glow::RGBA8 as i32,
            tex.width as i32,
            tex.height as i32,
            0,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            glow::PixelUnpackData::Slice(Some(&tex.rgba)),
        );
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, glow::REPEAT as i32);
        gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, glow::CLAMP_TO_EDGE as i32);
        gl.bind_texture(glow::TEXTURE_2D, None);
        Ok(texture)
    }
}

unsafe fn link_program(gl: &Context, vs_src: &str, fs_src: &str) -> Result<glow::Program, RenderError> {
    unsafe {
        let vs = compile_shader(gl, glow::VERTEX_SHADER, vs_src)?;
        let fs = match compile_shader(gl, glow::FRAGMENT_SHADER, fs_src) {
            Ok(fs) => fs,
            Err(e) => {
                gl.delete_shader(vs);
                return Err(e);
            }
        };

        let prog = match gl.create_program() {
            Ok(prog) => prog,
            Err(e) => {
                gl.delete_shader(vs);
                gl.delete_shader(fs);
                return Err(RenderError::Create(e));
            }
        };
        gl.attach_shader(prog, vs);
        gl.attach_shader(prog, fs);
        gl.link_program(prog);
        gl.detach_shader(prog, vs);
        gl.detach_shader(prog, fs);
        gl.delete_shader(vs);
        gl.delete_shader(fs);

        if !gl.get_program_link_status(prog) {
            let log = gl.get_program_info_log(prog);
            gl.delete_program(prog);
            return Err(RenderError::Link(log));
        }
        Ok(prog)
    }
}

unsafe fn compile_shader(gl: &Context, kind: u32, src: &str) -> Result<glow::Shader, RenderError> {
    unsafe {
        let shader = gl.create_shader(kind).map_err(RenderError::Create)?;
        gl.shader_source(shader, src);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let log = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(RenderError::Shader(log));
        }
        Ok(shader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_build_deletes_what_it_created() {
        let mut deleted = Vec::new();
        let result = build_owned::<u32, ()>(
            |owned| {
                owned.keep(1);
                owned.keep(2);
                owned.keep(3);
                Err(RenderError::Link("background program".into()))
            },
            |object| deleted.push(object),
        );
        assert!(matches!(result, Err(RenderError::Link(_))));
        assert_eq!(deleted, vec![3, 2, 1]);
    }

    #[test]
    fn successful_build_hands_objects_to_the_scene() {
        let mut deleted = Vec::new();
        let (value, mut owned) = build_owned(
            |owned| {
                owned.keep(7u32);
                owned.keep(8);
                Ok("scene")
            },
            |object: u32| deleted.push(object),
        )
        .unwrap();
        assert_eq!(value, "scene");
        assert!(deleted.is_empty());
        assert!(!owned.is_empty());

        owned.release(|object| deleted.push(object));
        assert_eq!(deleted, vec![8, 7]);
        assert!(owned.is_empty());

        // A second release finds nothing left.
        owned.release(|object| deleted.push(object));
        assert_eq!(deleted.len(), 2);
    }
}
