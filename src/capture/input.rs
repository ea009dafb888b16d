//! Capture from raw input devices, for sessions without an X display
//!
//! Listens on every /dev/input device with a left button or an ESC key.
//! The devices are not grabbed: the user's click reaches the compositor and
//! focuses the target window itself, so the resulting target carries no
//! coordinates. ESC also reaches the focused application.
//!
//! Requires membership in the `input` group.

use super::{Grab, GrabEvent, Grabber, TargetPoint};
use crate::error::CaptureError;
use evdev::{Device, InputEventKind, Key};
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;

/// Captures from /dev/input
#[derive(Debug, Default)]
pub struct EvdevGrabber;

impl EvdevGrabber {
    pub fn new() -> Self {
        Self
    }
}

impl Grabber for EvdevGrabber {
    fn grab(&self) -> Result<Box<dyn Grab>, CaptureError> {
        Ok(Box::new(EvdevGrab::open()?))
    }
}

struct EvdevGrab {
    devices: Vec<Device>,
    clicks: ClickTracker,
}

impl EvdevGrab {
    fn open() -> Result<Self, CaptureError> {
        let mut devices = Vec::new();
        for path in find_pointer_and_keyboard_devices()? {
            match Device::open(&path) {
                Ok(mut device) => {
                    set_nonblocking(&device);
                    // Whatever is queued predates the capture
                    let _ = device.fetch_events().map(|events| events.count());
                    tracing::debug!("Capturing from {:?}", path);
                    devices.push(device);
                }
                Err(e) => tracing::warn!("Failed to open {:?}: {}", path, e),
            }
        }

        if devices.is_empty() {
            return Err(CaptureError::Devices(
                "no mouse or keyboard could be opened".into(),
            ));
        }

        Ok(Self {
            devices,
            clicks: ClickTracker::default(),
        })
    }
}

impl Grab for EvdevGrab {
    fn poll(&mut self) -> Result<Option<GrabEvent>, CaptureError> {
        for device in &mut self.devices {
            let events = match device.fetch_events() {
                Ok(events) => events,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(CaptureError::Devices(e.to_string())),
            };
            for event in events {
                if let InputEventKind::Key(key) = event.kind() {
                    if let Some(grab_event) = self.clicks.feed(key, event.value()) {
                        return Ok(Some(grab_event));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Turns button and key transitions into grab events
///
/// A click counts on release of a press seen during the capture, so the
/// press that started the capture (or a drag already in progress) is
/// ignored, and the target has focus by the time typing starts.
#[derive(Debug, Default)]
struct ClickTracker {
    pressed: bool,
}

impl ClickTracker {
    fn feed(&mut self, key: Key, value: i32) -> Option<GrabEvent> {
        match (key, value) {
            (Key::KEY_ESC, 1) => Some(GrabEvent::Escape),
            (Key::BTN_LEFT, 1) => {
                self.pressed = true;
                None
            }
            (Key::BTN_LEFT, 0) if self.pressed => {
                self.pressed = false;
                Some(GrabEvent::Click(TargetPoint::unlocated()))
            }
            _ => None,
        }
    }
}

fn set_nonblocking(device: &Device) {
    let fd = device.as_raw_fd();
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags != -1 {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
    }
}

/// Event devices with a left button or an ESC key
fn find_pointer_and_keyboard_devices() -> Result<Vec<PathBuf>, CaptureError> {
    let input_dir = std::fs::read_dir("/dev/input")
        .map_err(|e| CaptureError::Devices(format!("/dev/input: {}", e)))?;

    let mut found = Vec::new();
    let mut denied = false;
    for entry in input_dir.flatten() {
        let path = entry.path();
        let is_event_device = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("event"))
            .unwrap_or(false);
        if !is_event_device {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                let relevant = device
                    .supported_keys()
                    .map(|keys| keys.contains(Key::BTN_LEFT) || keys.contains(Key::KEY_ESC))
                    .unwrap_or(false);
                if relevant {
                    found.push(path);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => denied = true,
            Err(e) => tracing::trace!("Skipping {:?}: {}", path, e),
        }
    }

    if found.is_empty() && denied {
        return Err(CaptureError::Devices("permission denied".into()));
    }
    Ok(found)
}
