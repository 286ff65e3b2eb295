pub mod shared {
    pub mod constants;
    pub mod frame;
    pub mod model_resolver;
    pub mod video_metadata;
}

pub mod detection {
    pub mod domain {
        pub mod face_landmarks;
        pub mod landmark_detector;
    }
    pub mod infrastructure;
}

pub mod capture {
    pub mod domain {
        pub mod camera_source;
    }
    pub mod infrastructure;
}

pub mod overlay {
    pub mod domain {
        pub mod overlay_renderer;
    }
    pub mod infrastructure;
}

pub mod transport {
    pub mod domain {
        pub mod landmark_codec;
        pub mod wireless_transport;
    }
    pub mod infrastructure;
}

pub mod pipeline {
    pub mod pipeline_controller;
    pub mod pipeline_error;
    pub mod pipeline_logger;
    pub mod session_state;

    #[cfg(test)]
    pub(crate) mod test_support;
}
