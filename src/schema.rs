//! Handwritten Diesel schema for the middleware tables.
//!
//! The SQL names are kept as the middleware database has always had them (upper-case tables,
//! camelCase SCADA field names). Rust-side column names are snake_case aliases.

diesel::table! {
    #[sql_name = "CMA_GD"]
    cma_gd (xid_gateway) {
        xid_gateway -> Text,
        subestacao -> Nullable<Text>,
        regional -> Nullable<Text>,
        host -> Nullable<Text>,
        status -> Nullable<Bool>,
    }
}

diesel::table! {
    #[sql_name = "EQP_MODBUS_IP"]
    eqp_modbus_ip (xid_equip) {
        xid_equip -> Text,
        xid_gateway -> Nullable<Text>,
        fabricante -> Nullable<Text>,
        modelo -> Nullable<Text>,
        #[sql_name = "type"]
        equipment_type -> Nullable<Text>,
        sap_id -> Nullable<Text>,
        enabled -> Nullable<Bool>,
        #[sql_name = "updatePeriodType"]
        update_period_type -> Nullable<Text>,
        #[sql_name = "maxReadBitCount"]
        max_read_bit_count -> Nullable<BigInt>,
        #[sql_name = "maxReadRegisterCount"]
        max_read_register_count -> Nullable<BigInt>,
        #[sql_name = "maxWriteRegisterCount"]
        max_write_register_count -> Nullable<BigInt>,
        host -> Nullable<Text>,
        port -> Nullable<BigInt>,
        retries -> Nullable<BigInt>,
        timeout -> Nullable<BigInt>,
        #[sql_name = "updatePeriods"]
        update_periods -> Nullable<BigInt>,
    }
}

diesel::table! {
    #[sql_name = "DP_MODBUS_IP"]
    dp_modbus_ip (xid_sensor) {
        xid_sensor -> Text,
        xid_equip -> Nullable<Text>,
        #[sql_name = "range"]
        register_range -> Nullable<Text>,
        #[sql_name = "modbusDataType"]
        modbus_data_type -> Nullable<Text>,
        additive -> Nullable<Double>,
        #[sql_name = "offset"]
        register_offset -> Nullable<BigInt>,
        bit -> Nullable<BigInt>,
        multiplier -> Nullable<Double>,
        #[sql_name = "slaveId"]
        slave_id -> Nullable<BigInt>,
        enabled -> Nullable<Bool>,
        nome -> Nullable<Text>,
        tipo -> Nullable<Text>,
        classificacao -> Nullable<Text>,
    }
}

diesel::table! {
    #[sql_name = "EQP_DNP3"]
    eqp_dnp3 (xid_equip) {
        xid_equip -> Text,
        xid_gateway -> Nullable<Text>,
        fabricante -> Nullable<Text>,
        modelo -> Nullable<Text>,
        #[sql_name = "type"]
        equipment_type -> Nullable<Text>,
        sap_id -> Nullable<Text>,
        enabled -> Nullable<Bool>,
        #[sql_name = "eventsPeriodType"]
        events_period_type -> Nullable<Text>,
        host -> Nullable<Text>,
        port -> Nullable<BigInt>,
        #[sql_name = "rbePollPeriods"]
        rbe_poll_periods -> Nullable<BigInt>,
        retries -> Nullable<BigInt>,
        #[sql_name = "slaveAddress"]
        slave_address -> Nullable<BigInt>,
        #[sql_name = "sourceAddress"]
        source_address -> Nullable<BigInt>,
        #[sql_name = "staticPollPeriods"]
        static_poll_periods -> Nullable<BigInt>,
        timeout -> Nullable<BigInt>,
    }
}

diesel::table! {
    #[sql_name = "DP_DNP3"]
    dp_dnp3 (xid_sensor) {
        xid_sensor -> Text,
        xid_equip -> Nullable<Text>,
        #[sql_name = "index"]
        point_index -> Nullable<BigInt>,
        timeon -> Nullable<BigInt>,
        timeoff -> Nullable<BigInt>,
        #[sql_name = "dnp3DataType"]
        dnp3_data_type -> Nullable<BigInt>,
        #[sql_name = "controlCommand"]
        control_command -> Nullable<BigInt>,
        enabled -> Nullable<Bool>,
        nome -> Nullable<Text>,
        tipo -> Nullable<Text>,
        classificacao -> Nullable<Text>,
    }
}

diesel::table! {
    #[sql_name = "EQP_TAGS"]
    eqp_tags (id) {
        id -> Text,
        xid_equip -> Nullable<Text>,
        nome -> Nullable<Text>,
        valor -> Nullable<Text>,
    }
}

diesel::table! {
    #[sql_name = "DP_TAGS"]
    dp_tags (id) {
        id -> Text,
        xid_sensor -> Nullable<Text>,
        nome -> Nullable<Text>,
        valor -> Nullable<Text>,
    }
}

diesel::allow_tables_to_appear_in_same_query!(cma_gd, eqp_modbus_ip, dp_modbus_ip, eqp_dnp3, dp_dnp3, eqp_tags, dp_tags);
