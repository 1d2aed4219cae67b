use crate::kernel::AxisOrder;
use crate::params::ParamSet;
use crate::plane::ComplexPlane;
use crossterm::event::{KeyCode, KeyModifiers, MouseButton};

/// Pixels moved per arrow key press.
const PAN_PIXELS: f64 = 10.0;

/// What the frame loop should do after an input event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Nothing bound to this input.
    Ignored,
    /// Parameters changed; render again even when paused.
    Redraw,
    TogglePause,
    /// Log the modified parameters.
    Report,
    Snapshot,
    Quit,
}

/// Live keyboard and mouse bindings over a [`ParamSet`].
///
/// Keys come from each parameter's [`crate::params::ParamMod`]; the fixed
/// bindings handle the Julia seed, panning and view reset.
#[derive(Debug, Clone, Copy)]
pub struct Controller {
    axis: AxisOrder,
}

impl Controller {
    pub fn new(axis: AxisOrder) -> Self {
        Self { axis }
    }

    /// Names of the seed components along the screen x and y axes.
    fn seed_axes(&self) -> (&'static str, &'static str) {
        match self.axis {
            AxisOrder::Normal => ("c_real", "c_imag"),
            AxisOrder::Swapped => ("c_imag", "c_real"),
        }
    }

    pub fn on_key(
        &self,
        code: KeyCode,
        mods: KeyModifiers,
        params: &mut ParamSet,
        view: &ComplexPlane,
    ) -> Action {
        if mods.contains(KeyModifiers::CONTROL) && matches!(code, KeyCode::Char('c')) {
            return Action::Quit;
        }
        if let KeyCode::Char(ch) = code {
            if self.apply_param_key(ch, params) {
                return Action::Redraw;
            }
        }

        let (x, y) = self.seed_axes();
        let (r_step, i_step) = (params["r_step"], params["i_step"]);
        let (pan_x, pan_y) = (PAN_PIXELS / view.scale().0, PAN_PIXELS / view.scale().1);
        match code {
            KeyCode::Esc => Action::Quit,
            KeyCode::Char(' ') => Action::TogglePause,
            KeyCode::Char('p') => Action::Report,
            KeyCode::Char('c') => Action::Snapshot,
            KeyCode::Char('q') => nudge(params, x, -r_step),
            KeyCode::Char('d') => nudge(params, x, r_step),
            KeyCode::Char('z') => nudge(params, y, -i_step),
            KeyCode::Char('s') => nudge(params, y, i_step),
            KeyCode::Left => nudge(params, "center_real", -pan_x),
            KeyCode::Right => nudge(params, "center_real", pan_x),
            KeyCode::Up => nudge(params, "center_imag", -pan_y),
            KeyCode::Down => nudge(params, "center_imag", pan_y),
            KeyCode::Char('r') => {
                params.reset_view();
                Action::Redraw
            }
            KeyCode::Char('m') => {
                params.toggle_flag("show_map");
                Action::Redraw
            }
            _ => Action::Ignored,
        }
    }

    /// Left click zooms in, right click zooms out; both recenter on the click.
    pub fn on_click(
        &self,
        button: MouseButton,
        pixel: (f64, f64),
        params: &mut ParamSet,
        view: &ComplexPlane,
    ) -> Action {
        let step = match button {
            MouseButton::Left => 3.0 / 4.0,
            MouseButton::Right => 4.0 / 3.0,
            MouseButton::Middle => {
                log::info!("clicked {pixel:?} -> {}", view.to_plane(pixel));
                return Action::Ignored;
            }
        };
        let point = view.to_plane(pixel);
        params["radius"] *= step;
        params.set_center(point);
        Action::Redraw
    }

    fn apply_param_key(&self, ch: char, params: &mut ParamSet) -> bool {
        let hit = params.mods().find_map(|(name, m)| {
            let (fwd, back) = m.keys?;
            let forward = if ch == fwd {
                true
            } else if ch == back {
                false
            } else {
                return None;
            };
            Some((name.to_string(), m.clone(), forward))
        });
        let Some((name, m, forward)) = hit else {
            return false;
        };

        let value = m.nudge(params[name.as_str()], forward);
        params[name.as_str()] = value;
        if m.recenters_map {
            let step = params["map_radius"] / 10.0;
            params["r_step"] = step;
            params["i_step"] = step;
            let (x, y) = self.seed_axes();
            let (cx, cy) = (params[x], params[y]);
            params["map_center_real"] = cx;
            params["map_center_imag"] = cy;
        }
        true
    }
}

fn nudge(params: &mut ParamSet, name: &str, delta: f64) -> Action {
    params[name] += delta;
    Action::Redraw
}
