//! Pre-built mock host states for testing.

use super::filesystem::MockFs;
use crate::collector::source::{GROUP_PATH, PASSWD_PATH};

impl MockFs {
    /// A small Linux host: three system accounts, one admin in `sudo`, one
    /// regular user.
    pub fn typical_host() -> Self {
        let mut fs = Self::new();

        fs.add_file(
            PASSWD_PATH,
            "\
root:x:0:0:root:/root:/bin/bash
daemon:x:1:1:daemon:/usr/sbin:/usr/sbin/nologin
nobody:x:65534:65534:nobody:/nonexistent:/usr/sbin/nologin
alice:x:1000:1000:Alice:/home/alice:/bin/bash
bob:x:1001:1001:Bob:/home/bob:/bin/bash
",
        );

        fs.add_file(
            GROUP_PATH,
            "\
root:x:0:
daemon:x:1:
sudo:x:27:alice
nogroup:x:65534:
alice:x:1000:
bob:x:1001:
developers:x:2000:alice,bob
",
        );

        fs
    }

    /// `typical_host` plus one extra account that is a member of `sudo`.
    pub fn typical_host_with_new_admin() -> Self {
        let mut fs = Self::typical_host();
        fs.append_line(PASSWD_PATH, "carol:x:1002:1002:Carol:/home/carol:/bin/bash");
        fs.add_file(
            GROUP_PATH,
            "\
root:x:0:
daemon:x:1:
sudo:x:27:alice,carol
nogroup:x:65534:
alice:x:1000:
bob:x:1001:
developers:x:2000:alice,bob
carol:x:1002:
",
        );
        fs
    }
}
