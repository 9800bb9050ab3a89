use eframe::egui::{self, Align2, Color32, Context, FontId, Sense, vec2};

use crate::config::Tunables;

pub mod backend;
pub mod buffers;
pub mod packets;
pub mod session;
pub mod sim;
pub mod worker;
mod view;

use session::{HostCapabilities, TierChoice, VizSession};
use view::ViewState;

const MAX_PIXELS_PER_POINT: f32 = 2.0;

pub struct MeshPulseApp {
    session: VizSession,
    view: ViewState,
    show_stats: bool,
}

impl MeshPulseApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        tunables: Tunables,
        choice: TierChoice,
        seed: u64,
    ) -> Self {
        let session = VizSession::init(
            tunables,
            HostCapabilities {
                background_context: true,
            },
            choice,
            seed,
        );

        Self {
            session,
            view: ViewState::new(),
            show_stats: false,
        }
    }
}

impl eframe::App for MeshPulseApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        if ctx.pixels_per_point() > MAX_PIXELS_PER_POINT {
            ctx.set_pixels_per_point(MAX_PIXELS_PER_POINT);
        }

        if ctx.input(|input| input.key_pressed(egui::Key::F1)) {
            self.show_stats = !self.show_stats;
        }

        let minimized = ctx.input(|input| input.viewport().minimized.unwrap_or(false));

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| {
                let (rect, _response) =
                    ui.allocate_exact_size(ui.available_size(), Sense::hover());

                if minimized || !ui.is_rect_visible(rect) {
                    return;
                }

                let dt = ui
                    .ctx()
                    .input(|input| input.stable_dt)
                    .clamp(1.0 / 240.0, 1.0 / 20.0);

                self.view.advance(dt);
                self.session.advance_frame(dt);

                let painter = ui.painter_at(rect);
                view::draw_scene(
                    &painter,
                    rect,
                    self.session.buffers(),
                    self.session.colors(),
                    &self.view,
                );

                if self.show_stats {
                    let text = format!(
                        "{} tier  |  {} nodes  |  {} links  |  {} packets",
                        self.session.tier().label(),
                        self.session.node_count(),
                        self.session.link_count(),
                        self.session.packet_count(),
                    );
                    painter.text(
                        rect.left_top() + vec2(10.0, 10.0),
                        Align2::LEFT_TOP,
                        text,
                        FontId::proportional(13.0),
                        Color32::from_gray(220),
                    );
                }

                ui.ctx().request_repaint();
            });
    }
}
