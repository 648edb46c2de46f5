//! Operating-system collaborators: profile directory, free space, clock.

#[cfg(target_os = "linux")]
pub mod linux;
pub mod pal;
pub mod windows;
