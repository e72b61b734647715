//! Engine modules: turn an accepted plan into work on the target machine.
//!
//! - [`storage`]: compiles the partition plan into `disk.sh`
//! - [`mount`]: mounts target filesystems in dependency order
//! - [`fstab`]: writes `/etc/fstab` for the provisioned root
//! - [`bootloader`]: GRUB for UEFI/BIOS plus the direct-kernel fallback

pub mod bootloader;
pub mod fstab;
pub mod mount;
pub mod storage;
