use std::process::Command;

/// A Linux network namespace managed via `ip netns`.
///
/// Creates the namespace on construction, initializes loopback, and
/// deletes the namespace on drop. Supports executing commands inside
/// the namespace and creating veth links to other namespaces.
pub struct Namespace {
    pub name: String,
}

impl Namespace {
    pub fn new(name: &str) -> Result<Self, std::io::Error> {
        // cleanup any existing namespace with the same name
        let _ = Command::new("sudo")
            .args(["ip", "netns", "del", name])
            .output();

        let output = Command::new("sudo")
            .args(["ip", "netns", "add", name])
            .output()?;

        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "Failed to create netns: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // Initialize loopback
        let _ = Command::new("sudo")
            .args(["ip", "netns", "exec", name, "ip", "link", "set", "lo", "up"])
            .output();

        Ok(Self {
            name: name.to_string(),
        })
    }

    pub fn exec(&self, cmd: &str, args: &[&str]) -> Result<std::process::Output, std::io::Error> {
        Command::new("sudo")
            .args(["ip", "netns", "exec", &self.name, cmd])
            .args(args)
            .output()
    }

    pub fn add_veth_link(
        &self,
        other: &Namespace,
        veth_name_local: &str,
        veth_name_peer: &str,
        ip_local: &str,
        ip_peer: &str,
    ) -> std::io::Result<()> {
        // Clean up potential leftovers in host
        let _ = Command::new("sudo")
            .args(["ip", "link", "del", veth_name_local])
            .output();

        // 1. Create veth pair in host
        let output = Command::new("sudo")
            .args([
                "ip",
                "link",
                "add",
                veth_name_local,
                "type",
                "veth",
                "peer",
                "name",
                veth_name_peer,
            ])
            .output()?;

        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "Failed to create veth pair: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // 2. Move veth_local to self
        let output = Command::new("sudo")
            .args(["ip", "link", "set", veth_name_local, "netns", &self.name])
            .output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "Failed to move local veth: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // 3. Move veth_peer to other
        let output = Command::new("sudo")
            .args(["ip", "link", "set", veth_name_peer, "netns", &other.name])
            .output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "Failed to move peer veth: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // 4. Configure self (local side)
        let output = self.exec("ip", &["addr", "add", ip_local, "dev", veth_name_local])?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "Failed to set local IP: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let output = self.exec("ip", &["link", "set", veth_name_local, "up"])?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "Failed to set local link up: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        // 5. Configure other (peer side)
        let output = other.exec("ip", &["addr", "add", ip_peer, "dev", veth_name_peer])?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "Failed to set peer IP: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let output = other.exec("ip", &["link", "set", veth_name_peer, "up"])?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "Failed to set peer link up: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(())
    }
}

impl Drop for Namespace {
    fn drop(&mut self) {
        let _ = Command::new("sudo")
            .args(["ip", "netns", "del", &self.name])
            .status();
    }
}
