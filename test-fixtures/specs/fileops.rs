//! Fixture: a small file-handle module mixing declaration shapes.
//!
//! `open`, `read_at` and `Handle::close` are instrumentable; the generic
//! helper and the `Default` impl are not.

pub struct Handle {
    pub fd: i32,
    pub open: bool,
}

pub fn open(path: &str) -> Result<Handle, String> {
    if path.is_empty() {
        return Err("empty path".to_owned());
    }
    Ok(Handle { fd: 3, open: true })
}

pub fn read_at(handle: &Handle, offset: usize) -> Vec<u8> {
    vec![0; offset.min(handle.fd as usize)]
}

impl Handle {
    pub fn close(&mut self) -> bool {
        let was_open = self.open;
        self.open = false;
        was_open
    }
}

pub fn collect_all<T: Clone>(items: &[T]) -> Vec<T> {
    items.to_vec()
}

impl Default for Handle {
    fn default() -> Self {
        Handle { fd: -1, open: false }
    }
}
