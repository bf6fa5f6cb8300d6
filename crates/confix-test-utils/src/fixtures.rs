//! Sample configuration contents, one per text grammar.

/// `sshd_config`-style content (space grammar)
pub const SSHD_CONFIG: &str = "\
# OpenSSH server configuration
Port 22
PermitRootLogin yes

# Keepalive
ClientAliveInterval 300
";

/// `logrotate.conf`-style content (open-eq grammar)
pub const LOGROTATE_CONF: &str = "\
# rotate weekly
weekly = yes
rotate = 4

create = yes
";

/// `sysctl.conf`-style content (closed-eq grammar)
pub const SYSCTL_CONF: &str = "\
# kernel hardening
kernel.randomize_va_space=1
net.ipv4.ip_forward=1
";

/// `jail.conf`-style content (tagged-block grammar)
pub const JAIL_CONF: &str = "\
; fail2ban
[DEFAULT]
bantime = 600
maxretry = 5

[sshd]
enabled = false
port = ssh
";

/// Contents with CRLF line endings and no final newline
pub const CRLF_NO_FINAL_NEWLINE: &str = "# windows style\r\nkey = value\r\nother = 1";
