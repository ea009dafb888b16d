//! X11 pointer/keyboard grab for target capture

use super::{Grab, GrabEvent, Grabber, TargetPoint, WindowHandle};
use crate::error::CaptureError;
use crate::keys::Keysym;
use x11rb::connection::Connection;
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xproto::{
    ConnectionExt as _, Cursor, EventMask, GrabMode, GrabStatus, Keycode, Window,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;

/// Crosshair glyph in the standard cursor font
const XC_CROSSHAIR: u16 = 34;

/// Grabs on the X server named by `display` (None uses `$DISPLAY`)
pub struct X11Grabber {
    display: Option<String>,
}

impl X11Grabber {
    pub fn new(display: Option<String>) -> Self {
        Self { display }
    }
}

impl Grabber for X11Grabber {
    fn grab(&self) -> Result<Box<dyn Grab>, CaptureError> {
        Ok(Box::new(X11Grab::acquire(self.display.as_deref())?))
    }
}

struct X11Grab {
    conn: RustConnection,
    root: Window,
    cursor: Cursor,
    escape: Vec<Keycode>,
    pointer: bool,
    keyboard: bool,
}

impl X11Grab {
    fn acquire(display: Option<&str>) -> Result<Self, CaptureError> {
        let (conn, screen_num) =
            x11rb::connect(display).map_err(|e| CaptureError::Display(e.to_string()))?;
        let root = conn.setup().roots[screen_num].root;

        let mut grab = Self {
            conn,
            root,
            cursor: x11rb::NONE,
            escape: Vec::new(),
            pointer: false,
            keyboard: false,
        };

        match grab.crosshair() {
            Ok(cursor) => grab.cursor = cursor,
            Err(e) => tracing::warn!("Crosshair cursor unavailable, capturing without it: {}", e),
        }
        grab.escape = grab.escape_keycodes()?;

        let status = grab
            .conn
            .grab_pointer(
                false,
                grab.root,
                EventMask::BUTTON_PRESS,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                grab.cursor,
                x11rb::CURRENT_TIME,
            )
            .map_err(connection)?
            .reply()
            .map_err(reply_error)?
            .status;
        if status != GrabStatus::SUCCESS {
            return Err(CaptureError::GrabRefused {
                device: "pointer",
                reason: format!("{:?}", status),
            });
        }
        grab.pointer = true;

        let status = grab
            .conn
            .grab_keyboard(
                false,
                grab.root,
                x11rb::CURRENT_TIME,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .map_err(connection)?
            .reply()
            .map_err(reply_error)?
            .status;
        if status != GrabStatus::SUCCESS {
            return Err(CaptureError::GrabRefused {
                device: "keyboard",
                reason: format!("{:?}", status),
            });
        }
        grab.keyboard = true;

        grab.conn.flush().map_err(connection)?;
        Ok(grab)
    }

    fn crosshair(&self) -> Result<Cursor, ReplyOrIdError> {
        let font = self.conn.generate_id()?;
        self.conn.open_font(font, b"cursor")?.check()?;

        let cursor = self.conn.generate_id()?;
        let created = self
            .conn
            .create_glyph_cursor(
                cursor,
                font,
                font,
                XC_CROSSHAIR,
                XC_CROSSHAIR + 1,
                0,
                0,
                0,
                0xffff,
                0xffff,
                0xffff,
            )
            .map_err(ReplyOrIdError::from)
            .and_then(|c| c.check().map_err(ReplyOrIdError::from));
        let _ = self.conn.close_font(font);
        created.map(|_| cursor)
    }

    fn escape_keycodes(&self) -> Result<Vec<Keycode>, CaptureError> {
        let setup = self.conn.setup();
        let (min, max) = (setup.min_keycode, setup.max_keycode);
        let reply = self
            .conn
            .get_keyboard_mapping(min, max - min + 1)
            .map_err(connection)?
            .reply()
            .map_err(reply_error)?;

        let per = reply.keysyms_per_keycode.max(1) as usize;
        Ok(reply
            .keysyms
            .chunks(per)
            .enumerate()
            .filter(|(_, syms)| syms.contains(&Keysym::ESCAPE.0))
            .map(|(i, _)| min + i as u8)
            .collect())
    }
}

impl Grab for X11Grab {
    fn poll(&mut self) -> Result<Option<GrabEvent>, CaptureError> {
        while let Some(event) = self.conn.poll_for_event().map_err(connection)? {
            match event {
                Event::ButtonPress(e) if e.detail == 1 => {
                    let window = (e.child != x11rb::NONE).then_some(WindowHandle(e.child));
                    return Ok(Some(GrabEvent::Click(TargetPoint::at(
                        e.root_x as i32,
                        e.root_y as i32,
                        window,
                    ))));
                }
                Event::KeyPress(e) if self.escape.contains(&e.detail) => {
                    return Ok(Some(GrabEvent::Escape));
                }
                other => tracing::trace!("Ignoring event during capture: {:?}", other),
            }
        }
        Ok(None)
    }
}

impl Drop for X11Grab {
    fn drop(&mut self) {
        if self.pointer {
            let _ = self.conn.ungrab_pointer(x11rb::CURRENT_TIME);
        }
        if self.keyboard {
            let _ = self.conn.ungrab_keyboard(x11rb::CURRENT_TIME);
        }
        if self.cursor != x11rb::NONE {
            let _ = self.conn.free_cursor(self.cursor);
        }
        if let Err(e) = self.conn.flush() {
            tracing::debug!("Failed to flush grab release: {}", e);
        }
        tracing::debug!("Capture grab released");
    }
}

fn connection(e: ConnectionError) -> CaptureError {
    CaptureError::Connection(e.to_string())
}

fn reply_error(e: ReplyError) -> CaptureError {
    match e {
        ReplyError::ConnectionError(e) => connection(e),
        ReplyError::X11Error(e) => CaptureError::GrabRefused {
            device: "display",
            reason: format!("{:?}", e.error_kind),
        },
    }
}
