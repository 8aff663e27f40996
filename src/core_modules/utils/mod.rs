pub mod frame_dump;
