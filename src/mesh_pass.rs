//! Offscreen GPU renderer with color and depth readback.
//!
//! [`GpuRenderer`] draws the scene's mesh into two color targets: an
//! `Rgba8Unorm` image and an `R32Float` image holding linear view depth
//! (cleared to `0.0`, so empty pixels read back as "no mesh"). A regular
//! `Depth32Float` attachment handles occlusion. After each draw both targets
//! are copied into mapped buffers and unpacked into a [`RenderOutput`].
//!
//! # Bind groups
//!
//! - **Group 0**: camera and light uniforms, written once
//! - **Group 1**: model uniforms, written every frame

use glam::{Mat4, Vec3};
use image::{Luma, Rgb};

use crate::error::RenderError;
use crate::gpu::GpuContext;
use crate::mesh::{Mesh, Vertex3d};
use crate::render::{RenderOutput, SceneRenderer};
use crate::scene::Scene;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_VALUE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Camera and light uniforms.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// World to camera space; the shader derives linear depth from it.
    pub view: [[f32; 4]; 4],
    /// Direction the light travels, `w` unused.
    pub light_dir: [f32; 4],
    /// Light color in `rgb`, intensity in `w`.
    pub light_color: [f32; 4],
}

/// Per-frame model uniforms.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelUniforms {
    pub model: [[f32; 4]; 4],
    /// Inverse transpose of `model`.
    pub normal_matrix: [[f32; 4]; 4],
    pub color: [f32; 4],
}

/// An offscreen target plus the buffer it is read back through.
struct ReadbackTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    buffer: wgpu::Buffer,
}

impl ReadbackTarget {
    fn new(
        device: &wgpu::Device,
        label: &str,
        format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        padded_bytes_per_row: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{} Readback", label)),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        Self {
            texture,
            view,
            buffer,
        }
    }
}

/// Renders the scene mesh offscreen on the GPU.
pub struct GpuRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    camera_bind_group: wgpu::BindGroup,
    model_buffer: wgpu::Buffer,
    model_bind_group: wgpu::BindGroup,
    mesh: Mesh,
    base_color: Vec3,
    color: ReadbackTarget,
    depth_value: ReadbackTarget,
    depth_view: wgpu::TextureView,
    padded_bytes_per_row: u32,
    width: u32,
    height: u32,
}

impl GpuRenderer {
    /// Uploads the scene and allocates `width` x `height` targets.
    pub fn new(gpu: &GpuContext, scene: &Scene, width: u32, height: u32) -> Self {
        let device = &gpu.device;
        let width = width.max(1);
        let height = height.max(1);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mesh.wgsl").into()),
        });

        let uniform_layout_entry = wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        // Camera uniform buffer (group 0)
        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Camera Uniforms"),
            size: std::mem::size_of::<CameraUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Camera Bind Group Layout"),
                entries: &[uniform_layout_entry],
            });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Camera Bind Group"),
            layout: &camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        // Model uniform buffer (group 1)
        let model_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Model Uniforms"),
            size: std::mem::size_of::<ModelUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let model_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Model Bind Group Layout"),
                entries: &[uniform_layout_entry],
            });
        let model_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Model Bind Group"),
            layout: &model_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: model_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mesh Pipeline Layout"),
            bind_group_layouts: &[&camera_bind_group_layout, &model_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[Vertex3d::LAYOUT],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[
                    Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                    Some(wgpu::ColorTargetState {
                        format: DEPTH_VALUE_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    }),
                ],
                compilation_options: Default::default(),
            }),
            // Two-sided: back faces are flipped in the fragment shader.
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                front_face: wgpu::FrontFace::Ccw,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let aspect = width as f32 / height as f32;
        let light = &scene.light;
        let camera_uniforms = CameraUniforms {
            view_proj: scene.camera.view_projection(aspect).to_cols_array_2d(),
            view: scene.camera.view_matrix().to_cols_array_2d(),
            light_dir: light.direction.extend(0.0).to_array(),
            light_color: light.color.extend(light.intensity).to_array(),
        };
        gpu.queue.write_buffer(
            &camera_buffer,
            0,
            bytemuck::cast_slice(&[camera_uniforms]),
        );

        let padded_bytes_per_row = align_to(width * 4, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let color = ReadbackTarget::new(
            device,
            "Overlay Color",
            COLOR_FORMAT,
            width,
            height,
            padded_bytes_per_row,
        );
        let depth_value = ReadbackTarget::new(
            device,
            "Overlay Linear Depth",
            DEPTH_VALUE_FORMAT,
            width,
            height,
            padded_bytes_per_row,
        );
        let depth_view = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Depth Texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: DEPTH_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            device: gpu.device.clone(),
            queue: gpu.queue.clone(),
            pipeline,
            camera_bind_group,
            model_buffer,
            model_bind_group,
            mesh: scene.geometry.upload(gpu),
            base_color: scene.base_color,
            color,
            depth_value,
            depth_view,
            padded_bytes_per_row,
            width,
            height,
        }
    }

    fn draw(&self, model: Mat4) {
        let model_uniforms = ModelUniforms {
            model: model.to_cols_array_2d(),
            normal_matrix: model.inverse().transpose().to_cols_array_2d(),
            color: self.base_color.extend(1.0).to_array(),
        };
        self.queue.write_buffer(
            &self.model_buffer,
            0,
            bytemuck::cast_slice(&[model_uniforms]),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Overlay Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Overlay Mesh Pass"),
                color_attachments: &[
                    Some(wgpu::RenderPassColorAttachment {
                        view: &self.color.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    }),
                    Some(wgpu::RenderPassColorAttachment {
                        view: &self.depth_value.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    }),
                ],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);
            render_pass.set_bind_group(1, &self.model_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.mesh.vertex_buffer.slice(..));
            render_pass
                .set_index_buffer(self.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..self.mesh.index_count, 0, 0..1);
        }

        for target in [&self.color, &self.depth_value] {
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &target.buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(self.padded_bytes_per_row),
                        rows_per_image: Some(self.height),
                    },
                },
                wgpu::Extent3d {
                    width: self.width,
                    height: self.height,
                    depth_or_array_layers: 1,
                },
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Maps both readback buffers and waits for the GPU.
    fn map_readback(&self) -> Result<(), RenderError> {
        let (tx, rx) = std::sync::mpsc::channel();
        for target in [&self.color, &self.depth_value] {
            let tx = tx.clone();
            target
                .buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |res| {
                    let _ = tx.send(res);
                });
        }
        drop(tx);

        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RenderError::readback(format!("wgpu poll failed: {e:?}")))?;

        for _ in 0..2 {
            rx.recv()
                .map_err(|_| RenderError::readback("readback channel closed"))?
                .map_err(|e| RenderError::readback(format!("readback map failed: {e:?}")))?;
        }
        Ok(())
    }

    fn unpack(&self) -> RenderOutput {
        let mut out = RenderOutput::empty(self.width, self.height);
        let row_bytes = self.width as usize * 4;
        let padded = self.padded_bytes_per_row as usize;

        {
            let mapped = self.color.buffer.slice(..).get_mapped_range();
            for (y, row) in mapped.chunks(padded).take(self.height as usize).enumerate() {
                for (x, px) in row[..row_bytes].chunks_exact(4).enumerate() {
                    out.color
                        .put_pixel(x as u32, y as u32, Rgb([px[0], px[1], px[2]]));
                }
            }
        }
        {
            let mapped = self.depth_value.buffer.slice(..).get_mapped_range();
            for (y, row) in mapped.chunks(padded).take(self.height as usize).enumerate() {
                for (x, b) in row[..row_bytes].chunks_exact(4).enumerate() {
                    let depth = f32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                    out.depth.put_pixel(x as u32, y as u32, Luma([depth]));
                }
            }
        }

        self.color.buffer.unmap();
        self.depth_value.buffer.unmap();
        out
    }
}

impl SceneRenderer for GpuRenderer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn render(&mut self, model: Mat4) -> Result<RenderOutput, RenderError> {
        self.draw(model);
        self.map_readback()?;
        Ok(self.unpack())
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
