// ABOUTME: Declarative table of weighted risk detectors matched against raw command strings.
// ABOUTME: Each detector carries a category, case-insensitive regex, weight, reason, and optional safer substitute.

use std::fmt;
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// The family of risk a detector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Destructive,
    PrivilegeEscalation,
    RemoteExecution,
    PermissionChange,
    CredentialAccess,
    InsecureProtocol,
    SystemControl,
    VersionControl,
    PackageInstall,
}

impl Category {
    /// Generic mitigation advice for commands in this category.
    pub fn recommendation(self) -> &'static str {
        match self {
            Category::Destructive => {
                "Double-check target paths and prefer interactive (-i) or dry-run modes before deleting data."
            }
            Category::PrivilegeEscalation => {
                "Avoid elevated privileges; run with the least privilege the task needs."
            }
            Category::RemoteExecution => {
                "Download remote scripts to a file and review them before executing."
            }
            Category::PermissionChange => {
                "Grant only the permissions that are needed (for example 755 for directories, 644 for files)."
            }
            Category::CredentialAccess => {
                "Make sure secrets are not printed, copied, or sent off the machine."
            }
            Category::InsecureProtocol => {
                "Use encrypted protocols (https, ssh, sftp) and keep certificate verification on."
            }
            Category::SystemControl => {
                "Confirm that interrupting the system or its services is intended."
            }
            Category::VersionControl => {
                "Make sure rewriting history or discarding changes will not lose anyone's work."
            }
            Category::PackageInstall => {
                "Verify package names and sources before installing third-party code."
            }
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Category::Destructive => "destructive",
            Category::PrivilegeEscalation => "privilege_escalation",
            Category::RemoteExecution => "remote_execution",
            Category::PermissionChange => "permission_change",
            Category::CredentialAccess => "credential_access",
            Category::InsecureProtocol => "insecure_protocol",
            Category::SystemControl => "system_control",
            Category::VersionControl => "version_control",
            Category::PackageInstall => "package_install",
        })
    }
}

/// A safer substitute for a matched command.
///
/// `rewrites` are literal replacements tried against the actual command; the
/// first one that applies yields a concrete alternative. `fallback` is offered
/// when none of them apply.
#[derive(Debug)]
pub struct Alternative {
    pub rewrites: &'static [(&'static str, &'static str)],
    pub fallback: Option<&'static str>,
}

/// Static description of one detector.
#[derive(Debug)]
pub struct DetectorSpec {
    pub id: &'static str,
    pub category: Category,
    pub pattern: &'static str,
    pub weight: u8,
    pub reason: &'static str,
    pub alternative: Option<Alternative>,
}

/// A detector with its compiled pattern.
#[derive(Debug)]
pub struct Detector {
    pub spec: &'static DetectorSpec,
    regex: Regex,
}

impl Detector {
    pub fn is_match(&self, command: &str) -> bool {
        self.regex.is_match(command)
    }
}

/// Ordered detector table. Order determines the order of `risk_reasons`.
pub static DETECTOR_SPECS: &[DetectorSpec] = &[
    // Destructive filesystem operations.
    DetectorSpec {
        id: "rm_recursive_force",
        category: Category::Destructive,
        pattern: r"\brm\s+(?:-\S+\s+)*(?:-[a-z]*r[a-z]*f[a-z]*|-[a-z]*f[a-z]*r[a-z]*|-r\s+-f|-f\s+-r|--recursive\s+--force|--force\s+--recursive)(?:\s|$)",
        weight: 40,
        reason: "Recursive forced delete (rm -rf)",
        alternative: Some(Alternative {
            rewrites: &[("rm -rf", "rm -ri"), ("rm -fr", "rm -ri")],
            fallback: Some("rm -ri <path>"),
        }),
    },
    DetectorSpec {
        id: "rm_root",
        category: Category::Destructive,
        pattern: r"\brm\s+(?:-\S+\s+)*(?:/\*?|~/?\*?|\$HOME/?\*?)(?:\s|$|;|&|\|)",
        weight: 50,
        reason: "Deletes the filesystem root or home directory",
        alternative: None,
    },
    DetectorSpec {
        id: "rm_system_path",
        category: Category::Destructive,
        pattern: r"\brm\s+(?:-\S+\s+)*/(?:etc|usr|var|bin|sbin|boot|lib|lib64|opt|sys|proc|dev|root|home)(?:/|\s|$)",
        weight: 30,
        reason: "Deletes files under a system directory",
        alternative: None,
    },
    DetectorSpec {
        id: "disk_format",
        category: Category::Destructive,
        pattern: r"\b(?:mkfs(?:\.[a-z0-9]+)?|wipefs)\b",
        weight: 80,
        reason: "Formats or wipes a filesystem",
        alternative: None,
    },
    DetectorSpec {
        id: "disk_overwrite",
        category: Category::Destructive,
        pattern: r"\bdd\b.*\bof=/dev/|>\s*/dev/(?:sd[a-z]|hd[a-z]|nvme|disk|mmcblk)",
        weight: 80,
        reason: "Writes directly to a block device",
        alternative: None,
    },
    DetectorSpec {
        id: "fork_bomb",
        category: Category::Destructive,
        pattern: r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
        weight: 80,
        reason: "Fork bomb",
        alternative: None,
    },
    DetectorSpec {
        id: "find_delete",
        category: Category::Destructive,
        pattern: r"\bfind\b.*(?:\s-delete\b|-exec\s+rm\b)",
        weight: 20,
        reason: "Bulk delete through find",
        alternative: Some(Alternative {
            rewrites: &[(" -delete", " -print")],
            fallback: None,
        }),
    },
    DetectorSpec {
        id: "shred",
        category: Category::Destructive,
        pattern: r"\bshred\b",
        weight: 30,
        reason: "Irrecoverably overwrites files (shred)",
        alternative: None,
    },
    // Privilege escalation.
    DetectorSpec {
        id: "sudo",
        category: Category::PrivilegeEscalation,
        pattern: r"\bsudo\b",
        weight: 40,
        reason: "Runs with elevated privileges (sudo)",
        alternative: None,
    },
    DetectorSpec {
        id: "su_root",
        category: Category::PrivilegeEscalation,
        pattern: r"\bsu(?:\s+-(?:\s|$)|\s+-l\b|\s+root\b|\s*$)",
        weight: 40,
        reason: "Switches to another user (su)",
        alternative: None,
    },
    DetectorSpec {
        id: "doas",
        category: Category::PrivilegeEscalation,
        pattern: r"\bdoas\b",
        weight: 40,
        reason: "Runs with elevated privileges (doas)",
        alternative: None,
    },
    DetectorSpec {
        id: "setuid_bit",
        category: Category::PrivilegeEscalation,
        pattern: r"\bchmod\s+(?:-\S+\s+)*(?:[ugoa]*\+s|[2467][0-7]{3})(?:\s|$)",
        weight: 30,
        reason: "Sets the setuid/setgid bit",
        alternative: None,
    },
    // Remote code execution.
    DetectorSpec {
        id: "curl_pipe_shell",
        category: Category::RemoteExecution,
        pattern: r"\b(?:curl|wget)\b[^|]*\|\s*(?:sudo\s+)?(?:ba|z|da|k)?sh\b",
        weight: 60,
        reason: "Pipes downloaded content straight into a shell",
        alternative: Some(Alternative {
            rewrites: &[],
            fallback: Some("curl -fsSL <url> -o script.sh && less script.sh && sh script.sh"),
        }),
    },
    DetectorSpec {
        id: "remote_eval",
        category: Category::RemoteExecution,
        pattern: r"\beval\b.*\$\(\s*(?:curl|wget)\b|\b(?:(?:ba|z)?sh|source)\s+<\(\s*(?:curl|wget)\b",
        weight: 60,
        reason: "Evaluates downloaded content",
        alternative: None,
    },
    DetectorSpec {
        id: "base64_pipe_shell",
        category: Category::RemoteExecution,
        pattern: r"\bbase64\s+(?:-d|--decode)\b.*\|\s*(?:ba|z)?sh\b",
        weight: 50,
        reason: "Executes base64-decoded content",
        alternative: None,
    },
    // Permission weakening.
    DetectorSpec {
        id: "chmod_world_writable",
        category: Category::PermissionChange,
        pattern: r"\bchmod\s+(?:-\S+\s+)*(?:0?777|0?666|a\+rwx|ugo\+rwx|[ao]\+w)(?:\s|$)",
        weight: 30,
        reason: "Makes files world-writable",
        alternative: Some(Alternative {
            rewrites: &[
                ("chmod -R 777", "chmod -R 755"),
                ("chmod 777", "chmod 755"),
                ("chmod 666", "chmod 644"),
            ],
            fallback: Some("chmod 755 <path>"),
        }),
    },
    DetectorSpec {
        id: "chown_recursive",
        category: Category::PermissionChange,
        pattern: r"\bchown\s+(?:-\S+\s+)*-[a-z]*R",
        weight: 20,
        reason: "Recursively changes file ownership",
        alternative: None,
    },
    // Credential and secret access (informational).
    DetectorSpec {
        id: "secret_files",
        category: Category::CredentialAccess,
        pattern: r"\.ssh/|\bid_(?:rsa|dsa|ecdsa|ed25519)\b|\.aws/credentials|\.netrc\b|\.pgpass\b|/etc/shadow\b|\.env\b|\.kube/config|\.docker/config\.json",
        weight: 10,
        reason: "Touches credential or secret files",
        alternative: None,
    },
    DetectorSpec {
        id: "secret_env",
        category: Category::CredentialAccess,
        pattern: r"\$\{?[a-z0-9_]*(?:token|secret|password|passwd|api_key|apikey)[a-z0-9_]*\}?",
        weight: 10,
        reason: "References a secret-bearing environment variable",
        alternative: None,
    },
    // Insecure protocols.
    DetectorSpec {
        id: "plain_http",
        category: Category::InsecureProtocol,
        pattern: r"\bhttp://",
        weight: 10,
        reason: "Uses unencrypted http://",
        alternative: Some(Alternative {
            rewrites: &[("http://", "https://")],
            fallback: None,
        }),
    },
    DetectorSpec {
        id: "plaintext_tools",
        category: Category::InsecureProtocol,
        pattern: r"\b(?:telnet|ftp|rsh|rlogin)\b",
        weight: 10,
        reason: "Uses a plaintext remote protocol",
        alternative: Some(Alternative {
            rewrites: &[("telnet ", "ssh "), ("ftp ", "sftp ")],
            fallback: None,
        }),
    },
    DetectorSpec {
        id: "tls_verification_disabled",
        category: Category::InsecureProtocol,
        pattern: r"\bcurl\b.*\s(?:-k|--insecure)(?:\s|$)|\bwget\b.*--no-check-certificate",
        weight: 10,
        reason: "Disables TLS certificate verification",
        alternative: Some(Alternative {
            rewrites: &[(" --insecure", ""), (" -k", ""), (" --no-check-certificate", "")],
            fallback: None,
        }),
    },
    // System control.
    DetectorSpec {
        id: "shutdown",
        category: Category::SystemControl,
        pattern: r"\b(?:shutdown|reboot|halt|poweroff)\b|\binit\s+[06]\b",
        weight: 50,
        reason: "Shuts down or reboots the machine",
        alternative: None,
    },
    DetectorSpec {
        id: "mass_kill",
        category: Category::SystemControl,
        pattern: r"\bkill\s+-9\s+-1\b|\bkillall\b|\bpkill\b",
        weight: 20,
        reason: "Kills processes by name or en masse",
        alternative: None,
    },
    DetectorSpec {
        id: "crontab_remove",
        category: Category::SystemControl,
        pattern: r"\bcrontab\s+-r\b",
        weight: 30,
        reason: "Removes all scheduled cron jobs",
        alternative: Some(Alternative {
            rewrites: &[("crontab -r", "crontab -l")],
            fallback: None,
        }),
    },
    DetectorSpec {
        id: "write_system_config",
        category: Category::SystemControl,
        pattern: r">>?\s*/etc/|\btee\s+(?:-a\s+)?/etc/",
        weight: 40,
        reason: "Writes to system configuration under /etc",
        alternative: None,
    },
    DetectorSpec {
        id: "firewall_disable",
        category: Category::SystemControl,
        pattern: r"\biptables\s+(?:-F|--flush)\b|\bufw\s+disable\b",
        weight: 30,
        reason: "Flushes or disables firewall rules",
        alternative: None,
    },
    // Version control.
    DetectorSpec {
        id: "git_force_push",
        category: Category::VersionControl,
        pattern: r"\bgit\s+push\b.*\s(?:--force|-f)(?:\s|$)",
        weight: 30,
        reason: "Force-pushes over remote history",
        alternative: Some(Alternative {
            rewrites: &[
                ("push --force", "push --force-with-lease"),
                ("push -f", "push --force-with-lease"),
            ],
            fallback: Some("git push --force-with-lease"),
        }),
    },
    DetectorSpec {
        id: "git_reset_hard",
        category: Category::VersionControl,
        pattern: r"\bgit\s+reset\s+--hard\b",
        weight: 20,
        reason: "Discards uncommitted changes (git reset --hard)",
        alternative: Some(Alternative {
            rewrites: &[],
            fallback: Some("git stash"),
        }),
    },
    DetectorSpec {
        id: "git_clean_force",
        category: Category::VersionControl,
        pattern: r"\bgit\s+clean\s+-[a-z]*f",
        weight: 20,
        reason: "Deletes untracked files (git clean -f)",
        alternative: Some(Alternative {
            rewrites: &[("git clean -f", "git clean -n")],
            fallback: Some("git clean -n"),
        }),
    },
    // Package installation.
    DetectorSpec {
        id: "package_install",
        category: Category::PackageInstall,
        pattern: r"\b(?:npm|pnpm|yarn)\s+(?:install|i|add)\b|\bpip3?\s+install\b|\b(?:gem|cargo|go)\s+install\b|\b(?:apt|apt-get|yum|dnf|brew)\s+install\b",
        weight: 20,
        reason: "Installs third-party packages",
        alternative: None,
    },
];

/// Compiled detectors in table order.
pub static DETECTORS: LazyLock<Vec<Detector>> = LazyLock::new(|| {
    DETECTOR_SPECS
        .iter()
        .filter_map(|spec| {
            match RegexBuilder::new(spec.pattern).case_insensitive(true).build() {
                Ok(regex) => Some(Detector { spec, regex }),
                Err(e) => {
                    tracing::error!(detector = spec.id, error = %e, "detector pattern failed to compile");
                    None
                }
            }
        })
        .collect()
});
