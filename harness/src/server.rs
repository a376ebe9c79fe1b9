//! Child-process handle for one node. The process is killed on drop so a
//! failed run never leaves orphans behind.

use std::path::Path;

/// A spawned `exclusion-node` process.
pub struct Server(std::process::Child);

impl Server {
    pub fn spawn(
        binary: &Path,
        id: usize,
        count: usize,
        base_port: u16,
        delay_ms: u64,
    ) -> std::io::Result<Self> {
        let id = id.to_string();
        let count = count.to_string();
        let base_port = base_port.to_string();
        let delay = delay_ms.to_string();
        std::process::Command::new(binary)
            .args(["-i", &id])
            .args(["-c", &count])
            .args(["-p", &base_port])
            .args(["-d", &delay])
            .spawn()
            .map(Server)
    }

    /// True once the child has exited on its own.
    pub fn exited(&mut self) -> bool {
        matches!(self.0.try_wait(), Ok(Some(_)))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.0.kill().ok();
        self.0.wait().ok();
    }
}
