//! Browser host for the backdrop.
//!
//! Mounts a canvas into the container element, fetches every frame through
//! `HtmlImageElement::decode`, drives playback from `requestAnimationFrame`
//! and follows window resizes. All callbacks run on the page's event loop.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{debug, info, warn};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Element, HtmlCanvasElement, HtmlImageElement, Window};

use crate::loader::SlotOutcome;
use crate::render::web::CanvasTarget;
use crate::{Animator, AnimatorConfig, BackdropError, LifecycleEvent, LifecycleRelay};

struct Host {
    window: Window,
    animator: RefCell<Animator<CanvasTarget>>,
    relay: LifecycleRelay,
    raf_id: Cell<Option<i32>>,
    on_frame: RefCell<Option<Closure<dyn FnMut(f64)>>>,
}

/// A backdrop mounted into a page.
///
/// Dropping it stops playback, detaches the resize listener and removes the
/// canvas.
pub struct WebBackdrop {
    host: Rc<Host>,
    canvas: HtmlCanvasElement,
    on_resize: Closure<dyn FnMut()>,
}

fn now_ms(window: &Window) -> f64 {
    window.performance().map(|p| p.now()).unwrap_or(0.0)
}

fn viewport_size(window: &Window) -> (u32, u32) {
    let dim = |v: Result<wasm_bindgen::JsValue, wasm_bindgen::JsValue>| {
        v.ok().and_then(|v| v.as_f64()).unwrap_or(0.0).max(0.0) as u32
    };
    (dim(window.inner_width()), dim(window.inner_height()))
}

async fn decode_image(path: &str) -> Result<HtmlImageElement, String> {
    let img = HtmlImageElement::new().map_err(|_| "Failed to create image element".to_string())?;
    img.set_src(path);
    JsFuture::from(img.decode())
        .await
        .map_err(|e| e.as_string().unwrap_or_else(|| format!("Failed to decode {path}")))?;
    Ok(img)
}

fn find_container(window: &Window, container_key: &str) -> Option<Element> {
    window.document()?.get_element_by_id(container_key)
}

/// A styled canvas, not yet attached to the page.
fn create_canvas(window: &Window) -> Option<HtmlCanvasElement> {
    let canvas = window
        .document()?
        .create_element("canvas")
        .ok()?
        .dyn_into::<HtmlCanvasElement>()
        .ok()?;

    let style = canvas.style();
    for (prop, value) in [
        ("position", "absolute"),
        ("inset", "0"),
        ("width", "100%"),
        ("height", "100%"),
        ("pointer-events", "none"),
    ] {
        let _ = style.set_property(prop, value);
    }
    Some(canvas)
}

impl Host {
    /// Run `f` against the animator, then deliver the lifecycle events it
    /// raised once the borrow is released.
    fn with_animator<R>(&self, f: impl FnOnce(&mut Animator<CanvasTarget>) -> R) -> R {
        let result = f(&mut self.animator.borrow_mut());
        self.relay.flush();
        result
    }

    fn request_frame(&self) {
        if self.raf_id.get().is_some() {
            return;
        }
        let on_frame = self.on_frame.borrow();
        let Some(callback) = on_frame.as_ref() else {
            return;
        };
        match self.window.request_animation_frame(callback.as_ref().unchecked_ref()) {
            Ok(id) => self.raf_id.set(Some(id)),
            Err(_) => warn!("requestAnimationFrame failed; playback halted"),
        }
    }

    fn start_loop(self: &Rc<Self>) {
        if self.on_frame.borrow().is_none() {
            let weak = Rc::downgrade(self);
            let callback = Closure::<dyn FnMut(f64)>::new(move |timestamp: f64| {
                let Some(host) = weak.upgrade() else {
                    return;
                };
                host.raf_id.set(None);
                let tick = host.with_animator(|a| a.on_display_frame(timestamp));
                if tick.rearm() {
                    host.request_frame();
                }
            });
            *self.on_frame.borrow_mut() = Some(callback);
        }
        self.request_frame();
    }

    fn fetch(self: &Rc<Self>, slot: usize) {
        let Some(path) = self.animator.borrow().sequence().get(slot).map(|d| d.path.clone()) else {
            return;
        };
        let weak = Rc::downgrade(self);
        spawn_local(async move {
            let result = decode_image(&path).await;
            let Some(host) = weak.upgrade() else {
                return;
            };
            let now = now_ms(&host.window);
            let outcome = host.with_animator(|animator| match result {
                Ok(img) => animator.frame_loaded(slot, img, now),
                Err(reason) => animator.frame_failed(slot, &reason, now),
            });
            host.follow_up(outcome);
        });
    }

    fn follow_up(self: &Rc<Self>, outcome: SlotOutcome) {
        match outcome {
            SlotOutcome::Retry { slot, attempt } => {
                debug!(slot, attempt, "re-fetching frame");
                self.fetch(slot);
            }
            SlotOutcome::Ready { .. } => self.start_loop(),
            _ => {}
        }
    }

    fn arm_load_timeout(self: &Rc<Self>, timeout_ms: f64) {
        let weak: Weak<Host> = Rc::downgrade(self);
        let callback = Closure::once_into_js(move || {
            if let Some(host) = weak.upgrade() {
                let now = now_ms(&host.window);
                let outcome = host.with_animator(|a| a.poll_load_timeout(now));
                host.follow_up(outcome);
            }
        });
        // Pad slightly so the elapsed check is past the deadline when it fires.
        let delay = timeout_ms.ceil() as i32 + 1;
        if self
            .window
            .set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay)
            .is_err()
        {
            warn!("failed to arm frame load timeout");
        }
    }
}

impl WebBackdrop {
    /// Mount a backdrop into the element whose id is `config.container_key`.
    ///
    /// Returns `None` (after logging) when there is no window, the container
    /// is absent, or the config is invalid; the page is left untouched. The
    /// canvas is only attached once everything else succeeded.
    pub fn mount(config: AnimatorConfig) -> Option<Self> {
        let window = web_sys::window()?;
        let Some(container) = find_container(&window, &config.container_key) else {
            let err = BackdropError::container_missing(&config.container_key);
            info!(%err, "backdrop disabled");
            return None;
        };
        let target = match create_canvas(&window).map(CanvasTarget::new) {
            Some(Ok(target)) => target,
            Some(Err(err)) => {
                warn!(%err, "backdrop canvas unusable");
                return None;
            }
            None => {
                warn!(err = %BackdropError::host("failed to create canvas"), "backdrop disabled");
                return None;
            }
        };
        let canvas = target.canvas().clone();
        let mut animator = Animator::mount(config, Some(target))?;
        if container.append_child(&canvas).is_err() {
            warn!("failed to attach backdrop canvas");
            return None;
        }

        let relay = LifecycleRelay::new();
        relay.attach(&mut animator);
        let host = Rc::new(Host {
            window: window.clone(),
            animator: RefCell::new(animator),
            relay,
            raf_id: Cell::new(None),
            on_frame: RefCell::new(None),
        });

        let (width, height) = viewport_size(&window);
        host.animator.borrow_mut().resize(width, height);

        let weak = Rc::downgrade(&host);
        let on_resize = Closure::<dyn FnMut()>::new(move || {
            if let Some(host) = weak.upgrade() {
                let (width, height) = viewport_size(&host.window);
                host.animator.borrow_mut().resize(width, height);
            }
        });
        if window
            .add_event_listener_with_callback("resize", on_resize.as_ref().unchecked_ref())
            .is_err()
        {
            warn!("failed to attach resize listener");
        }

        Some(Self {
            host,
            canvas,
            on_resize,
        })
    }

    /// Register a lifecycle listener, e.g. to reveal page content once the
    /// frames are ready.
    ///
    /// Listeners run after the animator is released, so they may call back
    /// into the backdrop (`stop`, `subscribe`).
    pub fn subscribe(&self, listener: impl FnMut(&LifecycleEvent) + 'static) {
        self.host.relay.subscribe(listener);
    }

    /// Start fetching every frame. Playback begins by itself once they settle.
    pub fn load(&self) {
        let now = now_ms(&self.host.window);
        let Some((total, timeout)) = self.host.with_animator(|animator| {
            let total = animator.begin_loading(now)?.len();
            Some((total, animator.config().load_timeout_ms))
        }) else {
            return;
        };
        for slot in 0..total {
            self.host.fetch(slot);
        }
        if let Some(timeout) = timeout {
            self.host.arm_load_timeout(timeout);
        }
    }

    /// Stop playback. Safe to call any number of times.
    pub fn stop(&self) {
        self.host.with_animator(|a| a.stop());
        if let Some(id) = self.host.raf_id.take() {
            let _ = self.host.window.cancel_animation_frame(id);
        }
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }
}

impl Drop for WebBackdrop {
    fn drop(&mut self) {
        self.stop();
        let _ = self
            .host
            .window
            .remove_event_listener_with_callback("resize", self.on_resize.as_ref().unchecked_ref());
        self.canvas.remove();
    }
}
