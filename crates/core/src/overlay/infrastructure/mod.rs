pub mod overlay_file_writer;
pub mod raster_overlay_renderer;
