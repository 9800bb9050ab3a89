use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke, vec2};

use crate::config::ColorsSection;

use super::buffers::RenderBuffers;

const FOCAL_LENGTH: f32 = 420.0;
const ORBIT_SPEED: f32 = 0.1;

pub(in crate::app) struct ViewState {
    rotation: f32,
}

impl ViewState {
    pub(in crate::app) fn new() -> Self {
        Self { rotation: 0.0 }
    }

    pub(in crate::app) fn advance(&mut self, dt: f32) {
        self.rotation = (self.rotation + (dt * ORBIT_SPEED)) % std::f32::consts::TAU;
    }
}

struct Projection {
    center: Pos2,
    scale: f32,
    sin: f32,
    cos: f32,
}

impl Projection {
    fn new(rect: Rect, rotation: f32) -> Self {
        Self {
            center: rect.center(),
            scale: (rect.width().min(rect.height()) / 230.0).clamp(0.8, 4.0),
            sin: rotation.sin(),
            cos: rotation.cos(),
        }
    }

    fn project(&self, x: f32, y: f32, z: f32) -> (Pos2, f32) {
        let rotated_x = (x * self.cos) - (z * self.sin);
        let rotated_z = (x * self.sin) + (z * self.cos);
        let perspective = FOCAL_LENGTH / (FOCAL_LENGTH + rotated_z.clamp(-FOCAL_LENGTH * 0.9, FOCAL_LENGTH));
        let screen = self.center
            + (vec2(rotated_x, y) * (self.scale * perspective));
        (screen, perspective)
    }

    fn project_buffer(&self, buffer: &[f32], index: usize) -> (Pos2, f32) {
        let base = index * 3;
        self.project(buffer[base], buffer[base + 1], buffer[base + 2])
    }
}

fn tinted(color: [u8; 3], alpha: f32) -> Color32 {
    Color32::from_rgba_unmultiplied(
        color[0],
        color[1],
        color[2],
        (alpha.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    !(position.x + radius < rect.left()
        || position.x - radius > rect.right()
        || position.y + radius < rect.top()
        || position.y - radius > rect.bottom())
}

pub(in crate::app) fn draw_scene(
    painter: &Painter,
    rect: Rect,
    buffers: &RenderBuffers,
    colors: &ColorsSection,
    view: &ViewState,
) {
    painter.rect_filled(rect, 0.0, Color32::from_rgb(
        colors.background[0],
        colors.background[1],
        colors.background[2],
    ));

    let projection = Projection::new(rect, view.rotation);

    for index in 0..buffers.link_count {
        let base = index * 6;
        let (start, _) = projection.project(
            buffers.link_positions[base],
            buffers.link_positions[base + 1],
            buffers.link_positions[base + 2],
        );
        let (end, _) = projection.project(
            buffers.link_positions[base + 3],
            buffers.link_positions[base + 4],
            buffers.link_positions[base + 5],
        );
        let opacity = buffers.link_opacities[index];
        if opacity <= 0.01 {
            continue;
        }
        painter.line_segment([start, end], Stroke::new(1.0, tinted(colors.link, opacity)));
    }

    for index in 0..buffers.trail_count {
        let (position, perspective) = projection.project_buffer(&buffers.trail_positions, index);
        let alpha = buffers.trail_alphas[index];
        if alpha <= 0.01 || !circle_visible(rect, position, 4.0) {
            continue;
        }
        let size = buffers.trail_sizes[index] * projection.scale * perspective;
        let base = index * 3;
        let direction = vec2(
            (buffers.trail_directions[base] * projection.cos)
                - (buffers.trail_directions[base + 2] * projection.sin),
            buffers.trail_directions[base + 1],
        );
        let stretch = direction * (size * 2.2);
        painter.line_segment(
            [position - stretch, position + stretch],
            Stroke::new(size.max(0.5), tinted(colors.trail, alpha * 0.55)),
        );
    }

    for index in 0..buffers.node_count {
        let (position, perspective) = projection.project_buffer(&buffers.node_positions, index);
        let radius = (buffers.node_sizes[index] * projection.scale * perspective).clamp(0.6, 18.0);
        if !circle_visible(rect, position, radius * 2.4) {
            continue;
        }
        let opacity = buffers.node_opacities[index];

        painter.circle_filled(position, radius * 2.4, tinted(colors.node, opacity * 0.12));
        painter.circle_filled(position, radius, tinted(colors.node, opacity));
    }

    for index in 0..buffers.packet_count {
        let (position, perspective) = projection.project_buffer(&buffers.packet_positions, index);
        let intensity = buffers.packet_intensities[index];
        if intensity <= 0.01 {
            continue;
        }
        let radius = (buffers.packet_sizes[index] * projection.scale * perspective).clamp(0.8, 12.0);
        if !circle_visible(rect, position, radius * 3.0) {
            continue;
        }

        painter.circle_filled(position, radius * 3.0, tinted(colors.packet, intensity * 0.18));
        painter.circle_filled(position, radius, tinted(colors.packet, intensity));
    }
}
