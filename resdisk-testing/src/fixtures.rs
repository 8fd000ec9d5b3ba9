// SPDX-License-Identifier: GPL-3.0-only

//! Captured tool output from Azure VMs

pub const PARTED_GPT_TWO: &str = "\
Model: Msft Virtual Disk (scsi)
Disk /dev/sdb: 75.2GB
Sector size (logical/physical): 512B/4096B
Partition Table: gpt
Disk Flags:

Number  Start   End     Size    File system  Name                          Flags
 1      17.4kB  134MB   134MB                Microsoft reserved partition  msftres
 2      135MB   75.2GB  75.0GB  ntfs         Basic data partition          msftdata

";

/// Two partitions with a gap in the numbering, listed out of order
pub const PARTED_GPT_UNORDERED: &str = "\
Model: Msft Virtual Disk (scsi)
Disk /dev/sdb: 75.2GB
Sector size (logical/physical): 512B/4096B
Partition Table: gpt
Disk Flags:

Number  Start   End     Size    File system  Name                          Flags
 3      135MB   75.2GB  75.0GB  ntfs         Basic data partition          msftdata
 1      17.4kB  134MB   134MB                Microsoft reserved partition  msftres

";

pub const PARTED_GPT_ONE: &str = "\
Model: Msft Virtual Disk (scsi)
Disk /dev/sdb: 75.2GB
Sector size (logical/physical): 512B/4096B
Partition Table: gpt
Disk Flags:

Number  Start   End     Size    File system  Name     Flags
 1      1049kB  75.2GB  75.2GB  ext4         primary

";

pub const PARTED_MSDOS: &str = "\
Model: Msft Virtual Disk (scsi)
Disk /dev/sdb: 75.2GB
Sector size (logical/physical): 512B/4096B
Partition Table: msdos
Disk Flags:

Number  Start   End     Size    Type     File system  Flags
 1      1049kB  75.2GB  75.2GB  primary  ntfs

";

/// `mount` output with only the OS disk mounted
pub const MOUNT_TABLE_OS_ONLY: &str = "\
/dev/sda1 on / type ext4 (rw,relatime,discard)
proc on /proc type proc (rw,nosuid,nodev,noexec,relatime)
sysfs on /sys type sysfs (rw,nosuid,nodev,noexec,relatime)
/dev/sda15 on /boot/efi type vfat (rw,relatime)
";

/// `mount` output with `/dev/sdb1` mounted at `mount_point`
pub fn mount_table_with_resource(mount_point: &std::path::Path) -> String {
    format!(
        "{MOUNT_TABLE_OS_ONLY}/dev/sdb1 on {} type ext4 (rw,relatime)\n",
        mount_point.display()
    )
}

/// `swapon -s` output listing `path` as an active swap file
pub fn swapon_listing(path: &std::path::Path) -> String {
    format!(
        "Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority\n{}                  file\t\t2097148\t\t0\t\t-2\n",
        path.display()
    )
}
